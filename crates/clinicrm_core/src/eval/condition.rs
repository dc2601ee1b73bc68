//! Conjunctive condition evaluator.

use crate::eval::{FactSnapshot, RuleEvaluator};
use crate::model::rule::{ConditionOperator, Rule, RuleCondition};
use serde_json::Value;
use std::cmp::Ordering;

/// Fires when the rule is enabled and every condition holds.
///
/// Numbers compare numerically, strings lexically; `contains` works on
/// strings (substring) and arrays (membership); `in` expects an array value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl RuleEvaluator for ConditionEvaluator {
    fn matches(&self, rule: &Rule, facts: &FactSnapshot) -> bool {
        rule.enabled
            && rule
                .conditions
                .iter()
                .all(|condition| condition_holds(condition, facts))
    }
}

fn condition_holds(condition: &RuleCondition, facts: &FactSnapshot) -> bool {
    let Some(actual) = facts.get(&condition.field) else {
        return false;
    };
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Eq => loosely_equal(actual, expected),
        ConditionOperator::Ne => !loosely_equal(actual, expected),
        ConditionOperator::Gt => compare(actual, expected) == Some(Ordering::Greater),
        ConditionOperator::Gte => matches!(
            compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        ConditionOperator::Lt => compare(actual, expected) == Some(Ordering::Less),
        ConditionOperator::Lte => matches!(
            compare(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        ConditionOperator::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| loosely_equal(item, needle)),
            _ => false,
        },
        ConditionOperator::In => match expected {
            Value::Array(options) => options.iter().any(|option| loosely_equal(actual, option)),
            _ => false,
        },
    }
}

/// Equality that treats `500` and `500.0` as the same number.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::ConditionEvaluator;
    use crate::eval::{FactSnapshot, RuleEvaluator};
    use crate::model::rule::{ConditionOperator, RuleCondition, RuleDraft};
    use serde_json::json;

    fn rule(conditions: Vec<RuleCondition>, enabled: bool) -> crate::model::rule::Rule {
        RuleDraft {
            name: "test".to_string(),
            conditions,
            actions: Vec::new(),
            enabled,
        }
        .into_rule(0)
        .expect("valid rule")
    }

    #[test]
    fn all_conditions_must_hold() {
        let facts = FactSnapshot::new(json!({
            "deal": {"amount": 520},
            "department": "orthokeratology",
            "tags": ["vip", "myopia"]
        }));
        let matching = rule(
            vec![
                RuleCondition::new("deal.amount", ConditionOperator::Gte, json!(500)),
                RuleCondition::new(
                    "department",
                    ConditionOperator::In,
                    json!(["orthokeratology", "refractive"]),
                ),
                RuleCondition::new("tags", ConditionOperator::Contains, json!("vip")),
            ],
            true,
        );
        assert!(ConditionEvaluator.matches(&matching, &facts));

        let failing = rule(
            vec![
                RuleCondition::new("deal.amount", ConditionOperator::Gte, json!(550)),
                RuleCondition::new("department", ConditionOperator::Eq, json!("orthokeratology")),
            ],
            true,
        );
        assert!(!ConditionEvaluator.matches(&failing, &facts));
    }

    #[test]
    fn missing_fact_and_disabled_rule_never_match() {
        let facts = FactSnapshot::new(json!({"age": 12}));
        let missing = rule(
            vec![RuleCondition::new("visits", ConditionOperator::Ne, json!(0))],
            true,
        );
        assert!(!ConditionEvaluator.matches(&missing, &facts));

        let disabled = rule(Vec::new(), false);
        assert!(!ConditionEvaluator.matches(&disabled, &facts));
        assert!(ConditionEvaluator.matches(&rule(Vec::new(), true), &facts));
    }

    #[test]
    fn integer_and_float_compare_equal() {
        let facts = FactSnapshot::new(json!({"amount": 500.0}));
        let eq = rule(
            vec![RuleCondition::new("amount", ConditionOperator::Eq, json!(500))],
            true,
        );
        assert!(ConditionEvaluator.matches(&eq, &facts));
    }
}
