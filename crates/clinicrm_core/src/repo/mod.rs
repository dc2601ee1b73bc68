//! Repository contracts and in-memory implementations.
//!
//! # Responsibility
//! - Define the store interface each service is injected with.
//! - Give services a compare-and-swap primitive so read-modify-write on one
//!   entity is serialized per id.
//!
//! # Invariants
//! - A swap only applies when the caller saw the latest revision.
//! - Rule history is append-only; a rule edit and its history entry commit
//!   together or not at all.
//! - Multi-task writes (event batches, a completion with its follow-ups)
//!   commit together or not at all.
//! - Snapshots are taken under one lock and never observe a torn write.

use crate::model::referral::{Referral, ReferralId};
use crate::model::rule::{Rule, RuleId, RuleVersion};
use crate::model::task::{Task, TaskId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;

pub use memory::{InMemoryReferralRepository, InMemoryRuleRepository, InMemoryTaskRepository};

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-assigned write counter for one record.
pub type Revision = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    /// Backend could not serve the call (poisoned lock, I/O, timeout).
    Unavailable(String),
    /// Insert collided with an existing id.
    Duplicate(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
            Self::Duplicate(id) => write!(f, "duplicate record id: {id}"),
        }
    }
}

impl Error for RepoError {}

/// A record together with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub revision: Revision,
    pub value: T,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Applied(Revision),
    /// Someone else wrote first; re-read and retry.
    Stale,
    Missing,
}

pub trait ReferralRepository: Send + Sync {
    fn insert_referral(&self, referral: &Referral) -> RepoResult<()>;
    fn load_referral(&self, id: ReferralId) -> RepoResult<Option<Stamped<Referral>>>;
    fn swap_referral(&self, expected: Revision, referral: &Referral) -> RepoResult<SwapOutcome>;
    fn snapshot_referrals(&self) -> RepoResult<Vec<Referral>>;
}

pub trait TaskRepository: Send + Sync {
    /// Stores every task or, on any failure, none of them.
    fn insert_tasks(&self, tasks: &[Task]) -> RepoResult<()>;
    fn load_task(&self, id: TaskId) -> RepoResult<Option<Stamped<Task>>>;
    fn swap_task(&self, expected: Revision, task: &Task) -> RepoResult<SwapOutcome>;
    /// Swaps `task` and inserts `follow_ups` as one write. Nothing is stored
    /// unless the swap applies and every follow-up id is free.
    fn commit_completion(
        &self,
        expected: Revision,
        task: &Task,
        follow_ups: &[Task],
    ) -> RepoResult<SwapOutcome>;
    fn snapshot_tasks(&self) -> RepoResult<Vec<Task>>;
}

pub trait RuleRepository: Send + Sync {
    /// Stores a new rule with its initial history entry.
    fn insert_rule(&self, rule: &Rule, initial: &RuleVersion) -> RepoResult<()>;
    fn load_rule(&self, id: RuleId) -> RepoResult<Option<Rule>>;
    /// Replaces the rule and appends `entry` if the stored version still
    /// equals `expected_version`.
    fn commit_rule_edit(
        &self,
        expected_version: u32,
        rule: &Rule,
        entry: &RuleVersion,
    ) -> RepoResult<SwapOutcome>;
    /// Full history in append order; `None` when the rule is unknown.
    fn rule_history(&self, id: RuleId) -> RepoResult<Option<Vec<RuleVersion>>>;
    fn list_rules(&self) -> RepoResult<Vec<Rule>>;
}
