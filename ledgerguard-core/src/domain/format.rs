//! Human-readable policy rendering for tables and audit views

use super::catalog::Catalogs;
use super::condition::Condition;
use super::policy::Policy;

/// Text shown for a policy without conditions
pub const EMPTY_POLICY_TEXT: &str = "No conditions set";

/// Render a policy as `"<field> <operator> <value> AND ..."`
///
/// Total over any policy: ids missing from the catalogs render as
/// themselves.
pub fn format_policy(policy: &Policy, catalogs: &Catalogs) -> String {
    if policy.conditions.is_empty() {
        return EMPTY_POLICY_TEXT.to_string();
    }

    let separator = format!(" {} ", policy.logical_operator);
    policy
        .conditions
        .iter()
        .map(|c| format_condition(c, catalogs))
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Render one condition; blank parts are skipped
pub fn format_condition(condition: &Condition, catalogs: &Catalogs) -> String {
    let field_label = catalogs
        .field(&condition.field)
        .map(|f| f.label.as_str())
        .unwrap_or(condition.field.as_str());
    let operator_label = catalogs
        .operator_label(&condition.field, &condition.operator)
        .unwrap_or(condition.operator.as_str());
    let value = condition.value.to_string();

    [field_label, operator_label, value.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}
