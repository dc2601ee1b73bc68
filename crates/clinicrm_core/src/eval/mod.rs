//! Rule evaluation collaborator.
//!
//! # Responsibility
//! - Define the seam the task generator uses to ask "does this rule fire for
//!   these facts?".
//! - Ship a condition-based evaluator good enough for the bundled rules.
//!
//! # Invariants
//! - Disabled rules never match.
//! - A condition whose fact is missing never matches.

pub mod condition;

use crate::model::rule::Rule;
use serde_json::Value;

pub use condition::ConditionEvaluator;

/// Facts about a referral/customer at the time of an event, as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSnapshot {
    root: Value,
}

impl FactSnapshot {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Looks up a dotted path such as `lens.days_until_expiry`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.root, |node, segment| node.get(segment))
            .filter(|value| !value.is_null())
    }
}

/// Decides whether a rule fires for a fact snapshot.
pub trait RuleEvaluator: Send + Sync {
    fn matches(&self, rule: &Rule, facts: &FactSnapshot) -> bool;
}
