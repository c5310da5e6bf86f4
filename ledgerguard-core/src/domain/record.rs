//! Policy-bearing record domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::policy::Policy;

/// The record kinds that embed a policy as their matching predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    AutomationRule,
    Sla,
    PermissionPolicy,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::AutomationRule,
        RecordKind::Sla,
        RecordKind::PermissionPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::AutomationRule => "automation_rule",
            RecordKind::Sla => "sla",
            RecordKind::PermissionPolicy => "permission_policy",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    /// Accepts the stored name plus a few CLI-friendly aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "automation_rule" | "rule" => Ok(RecordKind::AutomationRule),
            "sla" => Ok(RecordKind::Sla),
            "permission_policy" | "permission" => Ok(RecordKind::PermissionPolicy),
            other => Err(format!(
                "unknown record kind '{}' (expected automation_rule, sla or permission_policy)",
                other
            )),
        }
    }
}

/// A stored record that owns its own copy of a policy
///
/// Kind-specific details (the action an automation rule takes, an SLA
/// threshold, the user a permission policy belongs to) live in `metadata`
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: Uuid,
    pub kind: RecordKind,
    pub name: String,
    pub policy: Policy,
    pub metadata: JsonValue,
    pub enabled: bool,
    /// Starts at 1, bumped on every successful update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PolicyRecord {
    pub fn new(kind: RecordKind, name: impl Into<String>, policy: Policy) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            policy,
            metadata: JsonValue::Object(Default::default()),
            enabled: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    /// Validate record-level fields (the policy is validated separately)
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("record name cannot be empty");
        }
        if !self.metadata.is_object() {
            return Err("metadata must be a JSON object");
        }
        Ok(())
    }
}
