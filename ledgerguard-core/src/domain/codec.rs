//! Policy payload codec
//!
//! Reads are tolerant, writes are strict. Stored payloads come in several
//! shapes:
//!
//! ```json
//! {"logical_operator": "OR", "conditions": [{"field": "...", "operator": "...", "value": 1}]}
//! [{"field": "...", "operator": "...", "value": "x"}]
//! "{\"logical_operator\": \"AND\", \"conditions\": []}"
//! ```
//!
//! Anything unrecognisable, including blank input, decodes to the seed
//! policy so an editor always has a row to work with. A well-formed payload
//! with no conditions stays empty. Writes always produce the first
//! (canonical) shape.

use serde_json::{Map, Value};

use super::condition::{Condition, ConditionValue};
use super::policy::{LogicalOperator, Policy};

/// How many layers of JSON-in-a-string are unwrapped
const MAX_ENCODING_DEPTH: usize = 2;

/// Shape of a persisted payload
#[derive(Debug)]
enum PolicyPayload<'a> {
    /// `{logical_operator, conditions}`
    Canonical(&'a Map<String, Value>),
    /// Bare array of conditions, implies AND
    Legacy(&'a [Value]),
    /// One of the above, JSON-encoded into a string
    Encoded(&'a str),
    Malformed,
}

impl<'a> PolicyPayload<'a> {
    fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(map) if map.contains_key("conditions") => PolicyPayload::Canonical(map),
            Value::Array(items) => PolicyPayload::Legacy(items),
            Value::String(s) => PolicyPayload::Encoded(s),
            _ => PolicyPayload::Malformed,
        }
    }
}

/// Decode any stored payload into a policy
pub fn parse_policy_payload(value: &Value) -> Policy {
    decode(value, 0).unwrap_or_else(Policy::seed)
}

/// Decode a payload held as JSON text
pub fn parse_policy_str(content: &str) -> Policy {
    match serde_json::from_str::<Value>(content) {
        Ok(value) => parse_policy_payload(&value),
        Err(_) => Policy::seed(),
    }
}

/// Canonical JSON for a policy
pub fn to_policy_json(policy: &Policy) -> Value {
    let conditions = policy
        .conditions
        .iter()
        .map(|c| {
            let mut obj = Map::new();
            obj.insert("field".to_string(), Value::String(c.field.clone()));
            obj.insert("operator".to_string(), Value::String(c.operator.clone()));
            obj.insert("value".to_string(), value_to_json(&c.value));
            Value::Object(obj)
        })
        .collect();

    let mut obj = Map::new();
    obj.insert(
        "logical_operator".to_string(),
        Value::String(policy.logical_operator.as_str().to_string()),
    );
    obj.insert("conditions".to_string(), Value::Array(conditions));
    Value::Object(obj)
}

/// Canonical JSON text for a policy
pub fn to_policy_string(policy: &Policy) -> String {
    to_policy_json(policy).to_string()
}

fn decode(value: &Value, depth: usize) -> Option<Policy> {
    match PolicyPayload::classify(value) {
        PolicyPayload::Canonical(map) => {
            let logical_operator = match map.get("logical_operator") {
                None | Some(Value::Null) => LogicalOperator::And,
                Some(Value::String(s)) => s.parse().ok()?,
                Some(_) => return None,
            };
            let items = map.get("conditions")?.as_array()?;
            Some(Policy::new(logical_operator, decode_conditions(items)?))
        }
        PolicyPayload::Legacy(items) => {
            Some(Policy::new(LogicalOperator::And, decode_conditions(items)?))
        }
        PolicyPayload::Encoded(text) if depth < MAX_ENCODING_DEPTH => {
            let inner: Value = serde_json::from_str(text).ok()?;
            decode(&inner, depth + 1)
        }
        PolicyPayload::Encoded(_) | PolicyPayload::Malformed => None,
    }
}

fn decode_conditions(items: &[Value]) -> Option<Vec<Condition>> {
    items.iter().map(decode_condition).collect()
}

/// Decode one condition object; a per-condition `logic` key is ignored
fn decode_condition(item: &Value) -> Option<Condition> {
    let obj = item.as_object()?;
    let value = match obj.get("value") {
        None | Some(Value::Null) => ConditionValue::empty(),
        Some(Value::Number(n)) => ConditionValue::Number(n.clone()),
        Some(Value::String(s)) => ConditionValue::Text(s.clone()),
        Some(_) => return None,
    };
    Some(Condition {
        field: text_member(obj, "field")?,
        operator: text_member(obj, "operator")?,
        value,
    })
}

fn text_member(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => None,
    }
}

fn value_to_json(value: &ConditionValue) -> Value {
    match value {
        ConditionValue::Number(n) => Value::Number(n.clone()),
        ConditionValue::Text(s) => Value::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_round_trip() {
        let payload = json!({
            "logical_operator": "OR",
            "conditions": [
                {"field": "grand_total", "operator": ">", "value": 10000},
                {"field": "vendor_name", "operator": "contains", "value": "Acme"},
                {"field": "credit_score_drop", "operator": ">=", "value": 12.5}
            ]
        });
        let policy = parse_policy_payload(&payload);
        assert_eq!(policy.logical_operator, LogicalOperator::Or);
        assert_eq!(policy.conditions.len(), 3);
        assert_eq!(to_policy_json(&policy), payload);
    }

    #[test]
    fn test_round_trip_preserves_condition_order() {
        let payload = json!({
            "logical_operator": "AND",
            "conditions": [
                {"field": "b", "operator": "equals", "value": "2"},
                {"field": "a", "operator": "equals", "value": "1"}
            ]
        });
        let policy = parse_policy_payload(&payload);
        assert_eq!(policy.conditions[0].field, "b");
        assert_eq!(to_policy_json(&policy), payload);
    }

    #[test]
    fn test_legacy_array_implies_and() {
        let payload = json!([{"field": "a", "operator": "equals", "value": 1}]);
        let policy = parse_policy_payload(&payload);
        assert_eq!(policy.logical_operator, LogicalOperator::And);
        assert_eq!(policy.conditions, vec![Condition::new("a", "equals", 1)]);
    }

    #[test]
    fn test_encoded_string_payloads() {
        let canonical = json!(r#"{"logical_operator":"or","conditions":[{"field":"a","operator":"equals","value":"x"}]}"#);
        let policy = parse_policy_payload(&canonical);
        assert_eq!(policy.logical_operator, LogicalOperator::Or);
        assert_eq!(policy.conditions[0].value, ConditionValue::from("x"));

        let legacy = json!(r#"[{"field":"a","operator":"equals","value":2}]"#);
        let policy = parse_policy_payload(&legacy);
        assert_eq!(policy.conditions, vec![Condition::new("a", "equals", 2)]);
    }

    #[test]
    fn test_parse_policy_str() {
        let policy = parse_policy_str(r#"{"logical_operator":"AND","conditions":[{"field":"a","operator":">","value":3}]}"#);
        assert_eq!(policy.conditions, vec![Condition::new("a", ">", 3)]);
        assert_eq!(parse_policy_str("not json at all"), Policy::seed());
    }

    #[test]
    fn test_malformed_inputs_yield_seed() {
        let cases = vec![
            Value::Null,
            json!(42),
            json!(true),
            json!({"rules": []}),
            json!({"logical_operator": "XOR", "conditions": [{"field": "a"}]}),
            json!({"logical_operator": "AND", "conditions": "oops"}),
            json!([1, 2, 3]),
            json!([{"field": "a", "operator": "equals", "value": {"nested": true}}]),
            json!("{broken"),
        ];
        for case in cases {
            assert_eq!(parse_policy_payload(&case), Policy::seed(), "input: {}", case);
        }
    }

    #[test]
    fn test_empty_conditions_stay_empty() {
        let payload = json!({"logical_operator": "OR", "conditions": []});
        let policy = parse_policy_payload(&payload);
        assert_eq!(policy, Policy::new(LogicalOperator::Or, vec![]));
        assert_eq!(to_policy_json(&policy), payload);

        assert_eq!(parse_policy_payload(&json!([])), Policy::default());
        assert_eq!(
            parse_policy_str(r#""{\"logical_operator\":\"OR\",\"conditions\":[]}""#),
            Policy::new(LogicalOperator::Or, vec![])
        );
    }

    #[test]
    fn test_blank_input_yields_seed() {
        assert_eq!(parse_policy_str(""), Policy::seed());
        assert_eq!(parse_policy_str("   "), Policy::seed());
        assert_eq!(parse_policy_payload(&json!("")), Policy::seed());
    }

    #[test]
    fn test_missing_members_default_to_blank() {
        let policy = parse_policy_payload(&json!({"conditions": [{"field": "grand_total"}]}));
        assert_eq!(policy.logical_operator, LogicalOperator::And);
        assert_eq!(policy.conditions, vec![Condition::new("grand_total", "", "")]);
    }

    #[test]
    fn test_vestigial_logic_is_ignored_and_never_written() {
        let payload = json!({
            "logical_operator": "AND",
            "conditions": [
                {"field": "a", "operator": "equals", "value": 1, "logic": "OR"},
                {"field": "b", "operator": "equals", "value": 2, "logic": "OR"}
            ]
        });
        let policy = parse_policy_payload(&payload);
        assert_eq!(policy.logical_operator, LogicalOperator::And);

        let written = to_policy_json(&policy);
        assert!(written["conditions"][0].get("logic").is_none());
    }

    #[test]
    fn test_legacy_is_rewritten_canonical() {
        let policy = parse_policy_payload(&json!([{"field": "a", "operator": "equals", "value": "z"}]));
        let written: Value = serde_json::from_str(&to_policy_string(&policy)).unwrap();
        assert_eq!(
            written,
            json!({
                "logical_operator": "AND",
                "conditions": [{"field": "a", "operator": "equals", "value": "z"}]
            })
        );
    }

    #[test]
    fn test_deeply_encoded_string_is_malformed() {
        let once = json!([{"field": "a", "operator": "equals", "value": 1}]).to_string();
        let twice = Value::String(once).to_string();
        let thrice = Value::String(twice.clone()).to_string();

        // Two layers of string encoding are unwrapped, a third is not
        assert_eq!(parse_policy_payload(&Value::String(twice)).conditions.len(), 1);
        assert_eq!(parse_policy_payload(&Value::String(thrice)), Policy::seed());
    }
}
