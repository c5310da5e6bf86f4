//! Condition domain entity

use std::fmt;

use serde::{Deserialize, Serialize};

/// Untyped condition value
///
/// Numbers keep their JSON representation so `100` stays `100` and
/// `2.5` stays `2.5` when written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(serde_json::Number),
    Text(String),
}

impl ConditionValue {
    pub fn empty() -> Self {
        ConditionValue::Text(String::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ConditionValue::Text(s) if s.trim().is_empty())
    }

    /// Numeric view of the value; numeric strings count
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConditionValue::Number(n) => n.as_f64(),
            ConditionValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

impl Default for ConditionValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Number(n) => write!(f, "{}", n),
            ConditionValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::Text(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        ConditionValue::Text(value)
    }
}

impl From<i32> for ConditionValue {
    fn from(value: i32) -> Self {
        ConditionValue::Number(value.into())
    }
}

impl From<i64> for ConditionValue {
    fn from(value: i64) -> Self {
        ConditionValue::Number(value.into())
    }
}

impl From<f64> for ConditionValue {
    /// Non-finite floats have no JSON form and become an empty value
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(ConditionValue::Number)
            .unwrap_or_default()
    }
}

/// One (field, operator, value) comparison
///
/// Empty `field` or `operator` is a valid in-progress editing state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<ConditionValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// A blank row as added by the builder
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        !self.field.trim().is_empty()
            && !self.operator.trim().is_empty()
            && !self.value.is_empty()
    }

    /// Merge a patch into this condition
    ///
    /// A patch that changes `field` clears operator and value and drops the
    /// rest of the patch.
    pub fn apply(&mut self, patch: ConditionPatch) {
        if let Some(field) = patch.field {
            if field != self.field {
                self.field = field;
                self.operator.clear();
                self.value = ConditionValue::empty();
                return;
            }
        }
        if let Some(operator) = patch.operator {
            self.operator = operator;
        }
        if let Some(value) = patch.value {
            self.value = value;
        }
    }
}

/// Partial update for a condition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionPatch {
    pub field: Option<String>,
    pub operator: Option<String>,
    pub value: Option<ConditionValue>,
}

impl ConditionPatch {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::default()
        }
    }

    pub fn operator(operator: impl Into<String>) -> Self {
        Self {
            operator: Some(operator.into()),
            ..Self::default()
        }
    }

    pub fn value(value: impl Into<ConditionValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<ConditionValue>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_change_resets_operator_and_value() {
        let mut condition = Condition::new("grand_total", ">", 100);
        condition.apply(ConditionPatch::field("vendor_name"));
        assert_eq!(condition, Condition::new("vendor_name", "", ""));
    }

    #[test]
    fn test_field_change_wins_over_rest_of_patch() {
        let mut condition = Condition::new("grand_total", ">", 100);
        condition.apply(
            ConditionPatch::field("vendor_name")
                .with_operator("contains")
                .with_value("Acme"),
        );
        assert_eq!(condition.field, "vendor_name");
        assert_eq!(condition.operator, "");
        assert!(condition.value.is_empty());
    }

    #[test]
    fn test_same_field_patch_keeps_other_parts() {
        let mut condition = Condition::new("grand_total", ">", 100);
        condition.apply(ConditionPatch::field("grand_total").with_value(250));
        assert_eq!(condition, Condition::new("grand_total", ">", 250));
    }

    #[test]
    fn test_completeness() {
        assert!(!Condition::empty().is_complete());
        assert!(!Condition::new("grand_total", ">", "").is_complete());
        assert!(!Condition::new("grand_total", "", 5).is_complete());
        assert!(Condition::new("grand_total", ">", 5).is_complete());
        assert!(Condition::new("grand_total", ">", 0).is_complete());
    }

    #[test]
    fn test_value_json_shape() {
        let n: ConditionValue = serde_json::from_str("100").unwrap();
        assert_eq!(n, ConditionValue::from(100));
        assert_eq!(serde_json::to_string(&n).unwrap(), "100");

        let f: ConditionValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(f.to_string(), "2.5");

        let s: ConditionValue = serde_json::from_str("\"Acme\"").unwrap();
        assert_eq!(s, ConditionValue::from("Acme"));
    }

    #[test]
    fn test_numeric_view() {
        assert_eq!(ConditionValue::from(3).as_f64(), Some(3.0));
        assert_eq!(ConditionValue::from(" 42.5 ").as_f64(), Some(42.5));
        assert_eq!(ConditionValue::from("forty").as_f64(), None);
        assert_eq!(ConditionValue::from(f64::NAN), ConditionValue::empty());
    }
}
