//! Time source abstraction.
//!
//! All timestamps in core are Unix epoch milliseconds. Services read "now"
//! through `Clock` so overdue derivation and analytics stay reproducible.

use crate::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Earliest caller-supplied timestamp accepted (1970-01-01T00:00:00Z).
pub const MIN_TIMESTAMP_MS: i64 = 0;
/// Latest caller-supplied timestamp accepted (9999-12-31T23:59:59.999Z).
pub const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

/// Rejects caller-supplied timestamps outside the supported calendar range.
pub fn check_timestamp(field: &str, value_ms: i64) -> CoreResult<i64> {
    if (MIN_TIMESTAMP_MS..=MAX_TIMESTAMP_MS).contains(&value_ms) {
        Ok(value_ms)
    } else {
        Err(CoreError::validation(format!(
            "{field} must be between {MIN_TIMESTAMP_MS} and {MAX_TIMESTAMP_MS} epoch milliseconds"
        )))
    }
}

/// `base` shifted by whole days, or `Validation` when the result leaves the
/// representable range.
pub fn shift_days(field: &str, base_ms: i64, days: i64) -> CoreResult<i64> {
    days.checked_mul(MILLIS_PER_DAY)
        .and_then(|offset| base_ms.checked_add(offset))
        .ok_or_else(|| CoreError::validation(format!("{field} is out of range")))
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Caller-driven clock for tests and sample generation.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
