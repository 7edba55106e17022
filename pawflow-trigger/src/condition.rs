use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    MatchesRegex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

impl TriggerCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// Pure evaluation of a condition list against flattened event data.
/// Missing fields, type mismatches and invalid regexes all fail closed.
/// An empty list always matches; `require_all` selects AND over OR and
/// short-circuits accordingly.
pub fn evaluate_conditions(
    data: &HashMap<String, Value>,
    conditions: &[TriggerCondition],
    require_all: bool,
) -> bool {
    let mut considered = false;
    for condition in conditions {
        if condition.field.is_empty() {
            continue;
        }
        considered = true;
        let matched = evaluate_one(data, condition);
        if require_all && !matched {
            return false;
        }
        if !require_all && matched {
            return true;
        }
    }
    // Nothing evaluated (empty or field-less list) always fires.
    if !considered {
        return true;
    }
    require_all
}

fn evaluate_one(data: &HashMap<String, Value>, condition: &TriggerCondition) -> bool {
    let Some(actual) = data.get(&condition.field) else {
        return false;
    };
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => values_equal(actual, expected),
        ConditionOperator::NotEquals => !values_equal(actual, expected),
        ConditionOperator::Contains => contains_check(actual, expected).unwrap_or(false),
        ConditionOperator::NotContains => {
            contains_check(actual, expected).map(|c| !c).unwrap_or(false)
        }
        ConditionOperator::StartsWith => match (actual.as_str(), expected.as_str()) {
            (Some(actual), Some(expected)) => actual.starts_with(expected),
            _ => false,
        },
        ConditionOperator::EndsWith => match (actual.as_str(), expected.as_str()) {
            (Some(actual), Some(expected)) => actual.ends_with(expected),
            _ => false,
        },
        ConditionOperator::GreaterThan => match (to_f64(actual), to_f64(expected)) {
            (Some(actual), Some(expected)) => actual > expected,
            _ => false,
        },
        ConditionOperator::LessThan => match (to_f64(actual), to_f64(expected)) {
            (Some(actual), Some(expected)) => actual < expected,
            _ => false,
        },
        ConditionOperator::MatchesRegex => match (actual.as_str(), expected.as_str()) {
            (Some(actual), Some(pattern)) => Regex::new(pattern)
                .map(|regex| regex.is_match(actual))
                .unwrap_or(false),
            _ => false,
        },
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (to_f64(actual), to_f64(expected)) {
        (Some(actual), Some(expected)) => actual == expected,
        _ => false,
    }
}

fn contains_check(actual: &Value, expected: &Value) -> Option<bool> {
    match actual {
        Value::String(haystack) => expected.as_str().map(|needle| haystack.contains(needle)),
        Value::Array(items) => Some(items.contains(expected)),
        _ => None,
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Flattens nested objects into dotted keys so conditions can address
/// fields like `result.data.score`.
pub fn flatten_into(prefix: &str, value: &Value, out: &mut HashMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&path, nested, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn cond(field: &str, operator: ConditionOperator, value: Value) -> TriggerCondition {
        TriggerCondition::new(field, operator, value)
    }

    #[test]
    fn extension_gate_fires_for_json_only() {
        let conditions = vec![cond("extension", ConditionOperator::Equals, json!("json"))];

        let json_file = data(&[("extension", json!("json"))]);
        let txt_file = data(&[("extension", json!("txt"))]);

        assert!(evaluate_conditions(&json_file, &conditions, true));
        assert!(!evaluate_conditions(&txt_file, &conditions, true));
    }

    #[test]
    fn string_operators() {
        let event = data(&[("file_name", json!("report_2025.json"))]);

        assert!(evaluate_conditions(
            &event,
            &[cond("file_name", ConditionOperator::Contains, json!("2025"))],
            true
        ));
        assert!(evaluate_conditions(
            &event,
            &[cond("file_name", ConditionOperator::NotContains, json!("draft"))],
            true
        ));
        assert!(evaluate_conditions(
            &event,
            &[cond("file_name", ConditionOperator::StartsWith, json!("report"))],
            true
        ));
        assert!(evaluate_conditions(
            &event,
            &[cond("file_name", ConditionOperator::EndsWith, json!(".json"))],
            true
        ));
        assert!(evaluate_conditions(
            &event,
            &[cond("file_name", ConditionOperator::MatchesRegex, json!(r"report_\d{4}"))],
            true
        ));
        // An invalid regex fails closed instead of erroring.
        assert!(!evaluate_conditions(
            &event,
            &[cond("file_name", ConditionOperator::MatchesRegex, json!("["))],
            true
        ));
    }

    #[test]
    fn numeric_comparisons_coerce_and_fail_closed() {
        let event = data(&[("size", json!(2048)), ("label", json!("big"))]);

        assert!(evaluate_conditions(
            &event,
            &[cond("size", ConditionOperator::GreaterThan, json!(1024))],
            true
        ));
        assert!(evaluate_conditions(
            &event,
            &[cond("size", ConditionOperator::LessThan, json!("4096"))],
            true
        ));
        // Non-numeric operand fails closed.
        assert!(!evaluate_conditions(
            &event,
            &[cond("label", ConditionOperator::GreaterThan, json!(10))],
            true
        ));
        // Numeric equality works across representations.
        assert!(evaluate_conditions(
            &event,
            &[cond("size", ConditionOperator::Equals, json!("2048"))],
            true
        ));
    }

    #[test]
    fn missing_fields_fail_closed() {
        let event = data(&[("extension", json!("json"))]);
        let conditions = vec![cond("file_name", ConditionOperator::Equals, json!("a"))];

        assert!(!evaluate_conditions(&event, &conditions, true));
        assert!(!evaluate_conditions(&event, &conditions, false));
    }

    #[test]
    fn empty_condition_list_always_fires() {
        let event = data(&[]);
        assert!(evaluate_conditions(&event, &[], true));
        assert!(evaluate_conditions(&event, &[], false));
    }

    #[test]
    fn require_all_and_any_semantics() {
        let event = data(&[("extension", json!("json")), ("size", json!(10))]);
        let one_true_one_false = vec![
            cond("extension", ConditionOperator::Equals, json!("json")),
            cond("size", ConditionOperator::GreaterThan, json!(100)),
        ];

        assert!(!evaluate_conditions(&event, &one_true_one_false, true));
        assert!(evaluate_conditions(&event, &one_true_one_false, false));
    }

    #[test]
    fn evaluation_is_pure() {
        let event = data(&[("extension", json!("json"))]);
        let conditions = vec![cond("extension", ConditionOperator::Equals, json!("json"))];

        let first = evaluate_conditions(&event, &conditions, true);
        for _ in 0..10 {
            assert_eq!(evaluate_conditions(&event, &conditions, true), first);
        }
    }

    #[test]
    fn array_contains_membership() {
        let event = data(&[("tags", json!(["urgent", "case-7"]))]);
        assert!(evaluate_conditions(
            &event,
            &[cond("tags", ConditionOperator::Contains, json!("urgent"))],
            true
        ));
        assert!(!evaluate_conditions(
            &event,
            &[cond("tags", ConditionOperator::Contains, json!("closed"))],
            true
        ));
    }

    #[test]
    fn flatten_produces_dotted_keys() {
        let mut out = HashMap::new();
        flatten_into(
            "result",
            &json!({"status": "completed", "data": {"score": 7}}),
            &mut out,
        );
        assert_eq!(out.get("result.status"), Some(&json!("completed")));
        assert_eq!(out.get("result.data.score"), Some(&json!(7)));
    }
}
