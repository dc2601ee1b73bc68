//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the ledger, rule, task and analytics
//!   operations callers use.
//! - Keep callers decoupled from store details.
//!
//! # Invariants
//! - Every read-modify-write on one entity goes through `write_with_retry`,
//!   so concurrent writers on the same id are serialized by the store's
//!   revision check.

use crate::error::{CoreError, CoreResult};
use crate::repo::{RepoResult, Revision, Stamped, SwapOutcome};
use log::{debug, warn};
use std::fmt::Display;

pub mod analytics_service;
pub mod commission;
pub mod referral_service;
pub mod rule_diff;
pub mod rule_service;
pub mod task_service;

/// Bounded load -> mutate -> compare-and-swap loop for one entity.
///
/// `mutate` runs against the freshest copy on every attempt, so invariant
/// checks see concurrent writes that landed first. Exhausting
/// `max_attempts` reports `StoreUnavailable` rather than blocking.
pub(crate) fn write_with_retry<T>(
    entity: &'static str,
    id: impl Display,
    max_attempts: u32,
    load: impl Fn() -> RepoResult<Option<Stamped<T>>>,
    mut mutate: impl FnMut(T) -> CoreResult<T>,
    swap: impl Fn(Revision, &T) -> RepoResult<SwapOutcome>,
) -> CoreResult<T> {
    for attempt in 1..=max_attempts {
        let current = load()?.ok_or_else(|| CoreError::not_found(entity, &id))?;
        let next = mutate(current.value)?;
        match swap(current.revision, &next)? {
            SwapOutcome::Applied(_) => return Ok(next),
            SwapOutcome::Stale => {
                debug!(
                    "event=write_retry module={} status=stale id={} attempt={}",
                    entity, id, attempt
                );
            }
            SwapOutcome::Missing => return Err(CoreError::not_found(entity, &id)),
        }
    }

    warn!(
        "event=write_retry module={} status=exhausted id={} attempts={}",
        entity, id, max_attempts
    );
    Err(CoreError::StoreUnavailable(format!(
        "{entity} {id} kept changing during update; gave up after {max_attempts} attempts"
    )))
}
