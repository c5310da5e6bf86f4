//! Policy domain entity

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Logical operator applied uniformly across a policy's conditions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalOperator {
    type Err = String;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AND" => Ok(LogicalOperator::And),
            "OR" => Ok(LogicalOperator::Or),
            other => Err(format!("unknown logical operator '{}'", other)),
        }
    }
}

/// A boolean predicate: conditions joined by one logical operator
///
/// A policy with no conditions is "empty" and matches nothing meaningful;
/// consumers must not assume at least one condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub logical_operator: LogicalOperator,
    pub conditions: Vec<Condition>,
}

impl Policy {
    pub fn new(logical_operator: LogicalOperator, conditions: Vec<Condition>) -> Self {
        Self {
            logical_operator,
            conditions,
        }
    }

    /// Starting point for editing: one blank condition joined by AND
    pub fn seed() -> Self {
        Self::new(LogicalOperator::And, vec![Condition::empty()])
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// True when every condition has field, operator and value set
    pub fn is_complete(&self) -> bool {
        self.conditions.iter().all(Condition::is_complete)
    }
}
