//! Deterministic sample data.
//!
//! Populates fresh in-memory stores through the real services so demos and
//! tests exercise the same invariants as production writes. The same seed
//! and config always yield the same statistics.

use crate::clock::{Clock, ManualClock, MILLIS_PER_DAY, MILLIS_PER_HOUR};
use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::eval::{ConditionEvaluator, FactSnapshot};
use crate::model::referral::{
    ConversionInput, Department, ProductLine, ReferralDraft, ReferralStatus,
};
use crate::model::task::{RemarkInput, TaskSource};
use crate::repo::{InMemoryReferralRepository, InMemoryTaskRepository};
use crate::service::referral_service::ReferralService;
use crate::service::task_service::{TaskEvent, TaskService};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Arc;

/// 2024-01-01T00:00:00Z.
pub const SAMPLE_EPOCH_MS: i64 = 1_704_067_200_000;

const STAFF: [&str; 6] = [
    "optometrist-01",
    "optometrist-02",
    "optician-01",
    "optician-02",
    "consultant-01",
    "consultant-02",
];
const DEPARTMENTS: [Department; 3] = [
    Department::Orthokeratology,
    Department::Refractive,
    Department::Other,
];
const PRODUCTS: [&str; 3] = ["ortho-k lens pair", "refractive surgery", "frame and lenses"];

/// Stores filled by `SampleGenerator::generate`, plus the clock they share.
pub struct SampleWorld {
    pub clock: Arc<ManualClock>,
    pub referrals: InMemoryReferralRepository,
    pub tasks: InMemoryTaskRepository,
    /// First instant covered by generated records.
    pub window_start: i64,
    /// Instant just after the last generated record.
    pub window_end: i64,
}

pub struct SampleGenerator {
    rng: StdRng,
}

impl SampleGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates `referral_count` referrals with a seeded mix of outcomes.
    ///
    /// Converted referrals get a referral task for the receiver; roughly
    /// half of those tasks are completed.
    pub fn generate(
        &mut self,
        config: &CoreConfig,
        referral_count: usize,
    ) -> CoreResult<SampleWorld> {
        let clock = Arc::new(ManualClock::new(SAMPLE_EPOCH_MS));
        let referrals = InMemoryReferralRepository::new();
        let tasks = InMemoryTaskRepository::new();
        let ledger = ReferralService::new(referrals.clone(), clock.clone(), config);
        let tracker = TaskService::new(
            tasks.clone(),
            clock.clone(),
            Arc::new(ConditionEvaluator),
            config,
        );

        for _ in 0..referral_count {
            clock.advance(self.rng.gen_range(1..=12i64) * MILLIS_PER_HOUR);

            let referrer = self.pick_staff();
            let mut receiver = self.pick_staff();
            while receiver == referrer {
                receiver = self.pick_staff();
            }
            let department = DEPARTMENTS[self.rng.gen_range(0..DEPARTMENTS.len())];
            let referral = ledger.create(ReferralDraft {
                referrer_id: Some(referrer.to_string()),
                receiver_id: Some(receiver.to_string()),
                target_department: Some(department),
                customer_id: Some(format!("customer-{:04}", self.rng.gen_range(1..=500u32))),
                notes: String::new(),
            })?;

            let outcome: u32 = self.rng.gen_range(0..100);
            if outcome < 45 {
                let product = PRODUCTS[self.rng.gen_range(0..PRODUCTS.len())];
                let amount = Decimal::from(self.rng.gen_range(30u32..=400) * 100);
                ledger.mark_converted(
                    referral.id,
                    ConversionInput {
                        deal_amount: amount,
                        deal_date: clock.now_ms(),
                        deal_owner: receiver.to_string(),
                        products: vec![ProductLine {
                            name: product.to_string(),
                            quantity: 1,
                            unit_price: amount,
                        }],
                        discounts: Vec::new(),
                        notes: None,
                    },
                )?;

                let created = tracker.create_from_event(
                    &TaskEvent {
                        source: TaskSource::Referral(referral.id),
                        customer_id: referral
                            .customer_id
                            .clone()
                            .unwrap_or_else(|| "walk-in".to_string()),
                        assigned_to: receiver.to_string(),
                        threshold_at: None,
                        notes: String::new(),
                        facts: FactSnapshot::default(),
                    },
                    None,
                )?;
                if self.rng.gen_bool(0.5) {
                    for task in created {
                        tracker.complete(
                            task.id,
                            Some(RemarkInput::new("customer contacted", receiver)),
                            Vec::new(),
                        )?;
                    }
                }
            } else if outcome < 60 {
                ledger.update_status(referral.id, ReferralStatus::Declined, None)?;
            } else if outcome < 70 {
                ledger.update_status(referral.id, ReferralStatus::Expired, None)?;
            }
        }

        let window_end = clock.now_ms() + 1;
        info!(
            "event=sample_generate module=sample status=ok referrals={}",
            referral_count
        );
        Ok(SampleWorld {
            clock,
            referrals,
            tasks,
            window_start: SAMPLE_EPOCH_MS,
            window_end,
        })
    }

    fn pick_staff(&mut self) -> &'static str {
        STAFF[self.rng.gen_range(0..STAFF.len())]
    }
}

/// Instant at which deals from the older half of the window are past the
/// hold period and the newer half are not.
pub fn sample_as_of(world: &SampleWorld, config: &CoreConfig) -> i64 {
    let midpoint = world.window_start + (world.window_end - world.window_start) / 2;
    midpoint + i64::from(config.commission.hold_days) * MILLIS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::SampleGenerator;
    use crate::config::CoreConfig;
    use crate::repo::ReferralRepository;

    #[test]
    fn generates_requested_referral_count() {
        let world = SampleGenerator::new(3)
            .generate(&CoreConfig::default(), 25)
            .expect("sample generation");
        let referrals = world.referrals.snapshot_referrals().expect("snapshot");
        assert_eq!(referrals.len(), 25);
        assert!(referrals.iter().all(|referral| referral.is_consistent()));
        assert!(world.window_end > world.window_start);
    }
}
