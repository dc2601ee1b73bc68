//! Domain model for the referral/commission/rule/task engine.
//!
//! # Responsibility
//! - Define the records owned by the ledger, rule registry and task tracker.
//! - Keep construction-time validation next to the data it guards.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - Referrals and tasks are never physically deleted; status changes instead.
//! - Timestamps are Unix epoch milliseconds.

pub mod page;
pub mod referral;
pub mod rule;
pub mod task;
