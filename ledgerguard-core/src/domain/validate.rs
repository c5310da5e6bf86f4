//! Save-time policy validation
//!
//! Incomplete rows and unknown catalog references are legal while editing.
//! Before a policy is persisted the owning record must pass these checks.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use super::catalog::{Catalogs, ValueType};
use super::condition::Condition;
use super::policy::Policy;

/// Operator whose value is a day count rather than a date
const DAY_COUNT_OPERATOR: &str = "is_within_next_days";

/// A problem that blocks saving a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyIssue {
    TooFewConditions { required: usize, found: usize },
    IncompleteCondition { index: usize },
    UnknownField { index: usize, field: String },
    UnknownOperator { index: usize, field: String, operator: String },
    EnumValueNotAllowed { index: usize, field: String, value: String },
    NotANumber { index: usize, field: String, value: String },
    InvalidDate { index: usize, field: String, value: String },
}

impl fmt::Display for PolicyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyIssue::TooFewConditions { required, found } => write!(
                f,
                "policy needs at least {} condition(s), found {}",
                required, found
            ),
            PolicyIssue::IncompleteCondition { index } => {
                write!(f, "condition {} is incomplete", index + 1)
            }
            PolicyIssue::UnknownField { index, field } => {
                write!(f, "condition {}: unknown field '{}'", index + 1, field)
            }
            PolicyIssue::UnknownOperator { index, field, operator } => write!(
                f,
                "condition {}: operator '{}' is not valid for field '{}'",
                index + 1,
                operator,
                field
            ),
            PolicyIssue::EnumValueNotAllowed { index, field, value } => write!(
                f,
                "condition {}: '{}' is not an allowed value for '{}'",
                index + 1,
                value,
                field
            ),
            PolicyIssue::NotANumber { index, field, value } => write!(
                f,
                "condition {}: '{}' expects a number, got '{}'",
                index + 1,
                field,
                value
            ),
            PolicyIssue::InvalidDate { index, field, value } => write!(
                f,
                "condition {}: '{}' expects a date (YYYY-MM-DD), got '{}'",
                index + 1,
                field,
                value
            ),
        }
    }
}

/// Collect every issue that blocks saving `policy`
pub fn validate_policy(
    policy: &Policy,
    catalogs: &Catalogs,
    min_conditions: usize,
) -> Vec<PolicyIssue> {
    let mut issues = Vec::new();

    if policy.conditions.len() < min_conditions {
        issues.push(PolicyIssue::TooFewConditions {
            required: min_conditions,
            found: policy.conditions.len(),
        });
    }

    for (index, condition) in policy.conditions.iter().enumerate() {
        if let Some(issue) = check_condition(index, condition, catalogs) {
            issues.push(issue);
        }
    }

    issues
}

fn check_condition(index: usize, condition: &Condition, catalogs: &Catalogs) -> Option<PolicyIssue> {
    if !condition.is_complete() {
        return Some(PolicyIssue::IncompleteCondition { index });
    }

    let field = match catalogs.field(&condition.field) {
        Some(field) => field,
        None => {
            return Some(PolicyIssue::UnknownField {
                index,
                field: condition.field.clone(),
            })
        }
    };

    let legal = catalogs
        .operators_for(field.value_type)
        .iter()
        .any(|op| op.id == condition.operator);
    if !legal {
        return Some(PolicyIssue::UnknownOperator {
            index,
            field: field.id.clone(),
            operator: condition.operator.clone(),
        });
    }

    let value = condition.value.to_string();
    match field.value_type {
        ValueType::Number if condition.value.as_f64().is_none() => Some(PolicyIssue::NotANumber {
            index,
            field: field.id.clone(),
            value,
        }),
        ValueType::Date if !is_valid_date_value(&condition.operator, value.trim()) => {
            Some(PolicyIssue::InvalidDate {
                index,
                field: field.id.clone(),
                value,
            })
        }
        ValueType::Enum => {
            let allowed = field
                .enum_values
                .as_ref()
                .map(|values| values.iter().any(|v| *v == value))
                .unwrap_or(false);
            if allowed {
                None
            } else {
                Some(PolicyIssue::EnumValueNotAllowed {
                    index,
                    field: field.id.clone(),
                    value,
                })
            }
        }
        _ => None,
    }
}

fn is_valid_date_value(operator: &str, value: &str) -> bool {
    if operator == DAY_COUNT_OPERATOR {
        value.parse::<u32>().is_ok()
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
    }
}
