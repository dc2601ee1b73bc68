//! Business rule definitions and their version history.
//!
//! # Responsibility
//! - Define rule conditions and the closed set of rule actions.
//! - Define immutable history entries (`RuleVersion`).
//!
//! # Invariants
//! - `current_version` starts at 1 and only ever grows by exactly 1.
//! - History entries are append-only and never rewritten.

use crate::error::{CoreError, CoreResult};
use crate::model::task::{TaskPriority, TaskType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type RuleId = Uuid;

static FIELD_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)*$").expect("valid field path regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    In,
}

/// One predicate over a fact snapshot, e.g. `days_until_expiry lte 30`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

impl RuleCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// What a matched rule asks the task generator to do.
///
/// Serialized as `{"type": ..., "params": {...}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum RuleAction {
    /// Task due a fixed number of days after the triggering event.
    CreateTask {
        task_type: TaskType,
        priority: TaskPriority,
        due_in_days: u32,
    },
    /// Task due a number of days before the event's threshold date.
    RemindBefore {
        task_type: TaskType,
        priority: TaskPriority,
        days_before: u32,
    },
}

impl RuleAction {
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::CreateTask { task_type, .. } | Self::RemindBefore { task_type, .. } => {
                *task_type
            }
        }
    }

    pub fn priority(&self) -> TaskPriority {
        match self {
            Self::CreateTask { priority, .. } | Self::RemindBefore { priority, .. } => *priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub enabled: bool,
    pub current_version: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Rule {
    /// Projection of the user-editable fields, used for field-level diffs.
    pub fn editable_projection(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "conditions": self.conditions,
            "actions": self.actions,
            "enabled": self.enabled,
        })
    }

    /// Returns a copy with `patch` applied. Identity and version are untouched.
    pub fn patched(&self, patch: &RulePatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.trim().to_string();
        }
        if let Some(conditions) = &patch.conditions {
            next.conditions = conditions.clone();
        }
        if let Some(actions) = &patch.actions {
            next.actions = actions.clone();
        }
        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        next
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::validation("rule name is required"));
        }
        validate_conditions(&self.conditions)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleDraft {
    pub name: String,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub enabled: bool,
}

impl RuleDraft {
    pub fn into_rule(self, now_ms: i64) -> CoreResult<Rule> {
        let rule = Rule {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            conditions: self.conditions,
            actions: self.actions,
            enabled: self.enabled,
            current_version: 1,
            created_at: now_ms,
            updated_at: now_ms,
        };
        rule.validate()?;
        Ok(rule)
    }
}

/// Partial update; `None` leaves the field as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulePatch {
    pub name: Option<String>,
    pub conditions: Option<Vec<RuleCondition>>,
    pub actions: Option<Vec<RuleAction>>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Immutable audit entry for one rule edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleVersion {
    pub rule_id: RuleId,
    /// Version that became active after this edit.
    pub version: u32,
    pub changed_by: String,
    pub changed_at: i64,
    pub changes: Vec<FieldChange>,
    pub comment: String,
}

fn validate_conditions(conditions: &[RuleCondition]) -> CoreResult<()> {
    for (index, condition) in conditions.iter().enumerate() {
        if !FIELD_PATH_RE.is_match(condition.field.as_str()) {
            return Err(CoreError::validation(format!(
                "conditions[{index}].field `{}` is not a valid fact path",
                condition.field
            )));
        }
        if condition.operator == ConditionOperator::In && !condition.value.is_array() {
            return Err(CoreError::validation(format!(
                "conditions[{index}].value must be an array for `in`"
            )));
        }
    }
    Ok(())
}
