//! Read-only rollups over the referral ledger and task tracker.
//!
//! # Responsibility
//! - Team and personal conversion/commission statistics for a time window.
//! - Per-department and per-user breakdowns plus a task summary.
//!
//! # Invariants
//! - One snapshot per store per call; nothing is written.
//! - Figures depend only on stored entities and the query (including
//!   `as_of`), never on the wall clock.
//! - An empty window yields zero rates, never a division error.

use crate::clock::MILLIS_PER_DAY;
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::referral::{Department, Referral, ReferralStatus};
use crate::model::task::{Task, TaskStatus};
use crate::repo::{ReferralRepository, TaskRepository};
use log::info;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

/// Statistics request. Referrals and tasks are selected by `created_at`
/// falling inside `[window_start, window_end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsQuery {
    pub window_start: i64,
    pub window_end: i64,
    pub department: Option<Department>,
    /// Restricts to one person's referrals (either side) and tasks, and
    /// counts only that person's share of commission.
    pub user_id: Option<String>,
    /// Instant used to split confirmed/pending commission and derive overdue.
    pub as_of: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionTotals {
    pub total: Decimal,
    pub confirmed: Decimal,
    pub pending: Decimal,
    pub estimated: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRow {
    pub key: String,
    pub total_referrals: u64,
    pub converted_referrals: u64,
    pub conversion_rate: f64,
    pub commission: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub total: u64,
    pub completed: u64,
    pub overdue: u64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionStats {
    pub window_start: i64,
    pub window_end: i64,
    pub as_of: i64,
    pub total_referrals: u64,
    pub converted_referrals: u64,
    pub pending_referrals: u64,
    pub declined_referrals: u64,
    pub expired_referrals: u64,
    pub conversion_rate: f64,
    pub commission: CommissionTotals,
    pub by_department: Vec<BreakdownRow>,
    pub by_user: Vec<BreakdownRow>,
    pub tasks: TaskSummary,
}

#[derive(Default)]
struct Tally {
    total: u64,
    converted: u64,
    commission: Decimal,
}

impl Tally {
    fn add(&mut self, converted: bool, commission: Decimal) {
        self.total += 1;
        if converted {
            self.converted += 1;
            self.commission += commission;
        }
    }

    fn into_row(self, key: String) -> BreakdownRow {
        BreakdownRow {
            key,
            total_referrals: self.total,
            converted_referrals: self.converted,
            conversion_rate: percentage(self.converted, self.total),
            commission: self.commission,
        }
    }
}

pub struct AnalyticsService<RR: ReferralRepository, TR: TaskRepository> {
    referrals: RR,
    tasks: TR,
    hold_ms: i64,
    currency_scale: u32,
}

impl<RR: ReferralRepository, TR: TaskRepository> AnalyticsService<RR, TR> {
    pub fn new(referrals: RR, tasks: TR, config: &CoreConfig) -> Self {
        Self {
            referrals,
            tasks,
            hold_ms: i64::from(config.commission.hold_days) * MILLIS_PER_DAY,
            currency_scale: config.commission.currency_scale,
        }
    }

    /// Team statistics over the window and optional department.
    pub fn team_stats(
        &self,
        window_start: i64,
        window_end: i64,
        department: Option<Department>,
        as_of: i64,
    ) -> CoreResult<CommissionStats> {
        self.stats(&AnalyticsQuery {
            window_start,
            window_end,
            department,
            user_id: None,
            as_of,
        })
    }

    /// Computes the full rollup for `query`.
    ///
    /// # Errors
    /// - `Validation` when the window is empty or inverted, or `user_id` is blank.
    /// - `StoreUnavailable` when a snapshot cannot be read.
    pub fn stats(&self, query: &AnalyticsQuery) -> CoreResult<CommissionStats> {
        if query.window_end <= query.window_start {
            return Err(CoreError::validation("window end must be after window start"));
        }
        let user_id = match &query.user_id {
            Some(raw) if raw.trim().is_empty() => {
                return Err(CoreError::validation("userId must not be blank"));
            }
            Some(raw) => Some(raw.trim()),
            None => None,
        };

        let in_window = |created_at: i64| {
            created_at >= query.window_start && created_at < query.window_end
        };

        let referrals: Vec<Referral> = self
            .referrals
            .snapshot_referrals()?
            .into_iter()
            .filter(|referral| in_window(referral.created_at))
            .filter(|referral| {
                query
                    .department
                    .map_or(true, |department| referral.target_department == department)
            })
            .filter(|referral| user_id.map_or(true, |user| referral.involves(user)))
            .collect();
        let tasks: Vec<Task> = self
            .tasks
            .snapshot_tasks()?
            .into_iter()
            .filter(|task| in_window(task.created_at))
            .filter(|task| user_id.map_or(true, |user| task.assigned_to == user))
            .collect();

        let mut stats = CommissionStats {
            window_start: query.window_start,
            window_end: query.window_end,
            as_of: query.as_of,
            total_referrals: referrals.len() as u64,
            converted_referrals: 0,
            pending_referrals: 0,
            declined_referrals: 0,
            expired_referrals: 0,
            conversion_rate: 0.0,
            commission: CommissionTotals::default(),
            by_department: Vec::new(),
            by_user: Vec::new(),
            tasks: summarize_tasks(&tasks, query.as_of),
        };

        let mut departments: BTreeMap<Department, Tally> = BTreeMap::new();
        let mut users: BTreeMap<String, Tally> = BTreeMap::new();

        for referral in &referrals {
            match referral.status {
                ReferralStatus::Converted => stats.converted_referrals += 1,
                ReferralStatus::Pending => stats.pending_referrals += 1,
                ReferralStatus::Declined => stats.declined_referrals += 1,
                ReferralStatus::Expired => stats.expired_referrals += 1,
            }
            let converted = referral.status == ReferralStatus::Converted;

            let amount = subject_share(referral, user_id);
            if let Some(conversion) = &referral.conversion {
                stats.commission.total += amount;
                if query.as_of.saturating_sub(conversion.deal_date) >= self.hold_ms {
                    stats.commission.confirmed += amount;
                } else {
                    stats.commission.pending += amount;
                }
            }
            departments
                .entry(referral.target_department)
                .or_default()
                .add(converted, amount);

            for party in parties(referral) {
                if user_id.map_or(true, |user| user == party) {
                    users
                        .entry(party.to_string())
                        .or_default()
                        .add(converted, subject_share(referral, Some(party)));
                }
            }
        }

        stats.conversion_rate = percentage(stats.converted_referrals, stats.total_referrals);
        if stats.converted_referrals > 0 {
            let average = stats.commission.total / Decimal::from(stats.converted_referrals);
            stats.commission.estimated = (average * Decimal::from(stats.pending_referrals))
                .round_dp_with_strategy(
                    self.currency_scale,
                    RoundingStrategy::MidpointAwayFromZero,
                );
        }
        stats.by_department = departments
            .into_iter()
            .map(|(department, tally)| tally.into_row(department.as_str().to_string()))
            .collect();
        stats.by_user = users
            .into_iter()
            .map(|(user, tally)| tally.into_row(user))
            .collect();

        info!(
            "event=analytics_stats module=analytics status=ok scope={} referrals={} tasks={}",
            if user_id.is_some() { "personal" } else { "team" },
            stats.total_referrals,
            stats.tasks.total
        );
        Ok(stats)
    }
}

/// Distinct participants of a referral; self-referrals count once.
fn parties(referral: &Referral) -> Vec<&str> {
    if referral.referrer_id == referral.receiver_id {
        vec![referral.referrer_id.as_str()]
    } else {
        vec![referral.referrer_id.as_str(), referral.receiver_id.as_str()]
    }
}

/// Commission attributable to `user` on this referral, or the full total
/// when no user is given. Zero for unconverted referrals.
fn subject_share(referral: &Referral, user: Option<&str>) -> Decimal {
    let Some(commission) = referral.commission() else {
        return Decimal::ZERO;
    };
    match user {
        None => commission.total,
        Some(user) => {
            let mut share = Decimal::ZERO;
            if referral.referrer_id == user {
                share += commission.referrer_commission;
            }
            if referral.receiver_id == user {
                share += commission.receiver_commission;
            }
            share
        }
    }
}

fn summarize_tasks(tasks: &[Task], as_of: i64) -> TaskSummary {
    let completed = tasks.iter().filter(|task| task.is_completed()).count() as u64;
    let overdue = tasks
        .iter()
        .filter(|task| task.effective_status(as_of) == TaskStatus::Overdue)
        .count() as u64;
    TaskSummary {
        total: tasks.len() as u64,
        completed,
        overdue,
        completion_rate: percentage(completed, tasks.len() as u64),
    }
}

/// `part / whole * 100` rounded to two decimals; 0 for an empty whole.
fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let rate = part as f64 / whole as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}
