//! Policy service - create, edit and describe policy-bearing records

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::domain::result::Error;
use crate::domain::{
    format_policy, validate_policy, Catalogs, Policy, PolicyIssue, PolicyRecord, RecordKind,
};
use crate::ports::PolicyStore;

/// Policy service for record management
pub struct PolicyService {
    store: Arc<dyn PolicyStore>,
    catalogs: Arc<Catalogs>,
    min_conditions: usize,
}

/// Fields to change on an existing record; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct RecordChanges {
    pub name: Option<String>,
    pub policy: Option<Policy>,
    pub metadata: Option<JsonValue>,
}

impl PolicyService {
    pub fn new(store: Arc<dyn PolicyStore>, catalogs: Arc<Catalogs>, min_conditions: usize) -> Self {
        Self {
            store,
            catalogs,
            min_conditions,
        }
    }

    pub fn catalogs(&self) -> &Catalogs {
        &self.catalogs
    }

    pub fn min_conditions(&self) -> usize {
        self.min_conditions
    }

    /// Issues that would block saving `policy`
    pub fn check(&self, policy: &Policy) -> Vec<PolicyIssue> {
        validate_policy(policy, &self.catalogs, self.min_conditions)
    }

    /// Render a policy for display
    pub fn format(&self, policy: &Policy) -> String {
        format_policy(policy, &self.catalogs)
    }

    /// Create a new record after validating its policy
    pub fn create(
        &self,
        kind: RecordKind,
        name: &str,
        policy: Policy,
        metadata: Option<JsonValue>,
    ) -> Result<PolicyRecord> {
        let mut record = PolicyRecord::new(kind, name.trim(), policy);
        if let Some(metadata) = metadata {
            record.metadata = metadata;
        }
        record.validate().map_err(Error::validation)?;
        self.ensure_valid(&record.policy)?;

        self.store.insert_record(&record)?;
        Ok(record)
    }

    /// Fetch a record, failing with `Error::NotFound` if it does not exist
    pub fn get(&self, id: Uuid) -> Result<PolicyRecord> {
        self.store
            .get_record(id)?
            .ok_or_else(|| Error::not_found(format!("record {}", id)).into())
    }

    pub fn list(&self, kind: Option<RecordKind>) -> Result<Vec<PolicyRecord>> {
        Ok(self.store.list_records(kind)?)
    }

    /// Apply changes to a record the caller read at `expected_version`
    ///
    /// A stale version fails with `Error::Conflict` and nothing is written.
    pub fn update(
        &self,
        id: Uuid,
        expected_version: i64,
        changes: RecordChanges,
    ) -> Result<PolicyRecord> {
        let mut record = self.get(id)?;
        if let Some(name) = changes.name {
            record.name = name.trim().to_string();
        }
        if let Some(metadata) = changes.metadata {
            record.metadata = metadata;
        }
        let policy_changed = changes.policy.is_some();
        if let Some(policy) = changes.policy {
            record.policy = policy;
        }

        record.validate().map_err(Error::validation)?;
        if policy_changed && record.enabled {
            self.ensure_valid(&record.policy)?;
        }

        Ok(self.store.update_record(&record, expected_version)?)
    }

    /// Enable or disable a record
    ///
    /// Enabling re-validates the stored policy, disabling never fails
    /// validation.
    pub fn set_enabled(&self, id: Uuid, expected_version: i64, enabled: bool) -> Result<PolicyRecord> {
        let mut record = self.get(id)?;
        if enabled {
            self.ensure_valid(&record.policy)?;
        }
        record.enabled = enabled;
        Ok(self.store.update_record(&record, expected_version)?)
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_record(id)? {
            return Err(Error::not_found(format!("record {}", id)).into());
        }
        Ok(())
    }

    /// Summary row for tables and JSON output
    pub fn describe(&self, record: &PolicyRecord) -> RecordSummary {
        RecordSummary {
            id: record.id.to_string(),
            kind: record.kind,
            name: record.name.clone(),
            enabled: record.enabled,
            version: record.version,
            condition_count: record.policy.conditions.len(),
            summary: self.format(&record.policy),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }

    fn ensure_valid(&self, policy: &Policy) -> Result<()> {
        let issues = self.check(policy);
        if issues.is_empty() {
            return Ok(());
        }
        let messages: Vec<String> = issues.iter().map(ToString::to_string).collect();
        Err(Error::validation(messages.join("; ")).into())
    }
}

/// Display-ready view of a record
#[derive(Debug, Serialize)]
pub struct RecordSummary {
    pub id: String,
    pub kind: RecordKind,
    pub name: String,
    pub enabled: bool,
    pub version: i64,
    pub condition_count: usize,
    pub summary: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;
    use crate::domain::{Condition, LogicalOperator};

    fn service() -> PolicyService {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        PolicyService::new(Arc::new(repo), Arc::new(Catalogs::default()), 1)
    }

    fn risk_policy() -> Policy {
        Policy::new(
            LogicalOperator::And,
            vec![
                Condition::new("missed_emis", ">=", 3),
                Condition::new("credit_score_drop", ">", 50),
            ],
        )
    }

    fn error_of(err: &anyhow::Error) -> &Error {
        err.downcast_ref::<Error>().expect("typed core error")
    }

    #[test]
    fn test_create_and_describe() {
        let service = service();
        let record = service
            .create(
                RecordKind::AutomationRule,
                "  Flag risky borrowers ",
                risk_policy(),
                Some(serde_json::json!({"action": "flag"})),
            )
            .unwrap();
        assert_eq!(record.name, "Flag risky borrowers");

        let summary = service.describe(&service.get(record.id).unwrap());
        assert_eq!(summary.summary, "Missed EMIs >= 3 AND Credit Score Drop > 50");
        assert_eq!(summary.condition_count, 2);
        assert_eq!(summary.version, 1);
    }

    #[test]
    fn test_create_rejects_empty_policy() {
        let service = service();
        let err = service
            .create(RecordKind::Sla, "Empty", Policy::default(), None)
            .unwrap_err();
        assert!(matches!(error_of(&err), Error::Validation(_)));
        assert!(err.to_string().contains("at least 1 condition"));
        assert!(service.list(None).unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_incompatible_condition() {
        let service = service();
        let policy = Policy::new(
            LogicalOperator::Or,
            vec![Condition::new("vendor_name", ">=", "Acme")],
        );
        let err = service
            .create(RecordKind::PermissionPolicy, "Vendors", policy, None)
            .unwrap_err();
        assert!(err.to_string().contains("not valid for field 'vendor_name'"));
    }

    #[test]
    fn test_update_with_version() {
        let service = service();
        let record = service
            .create(RecordKind::Sla, "Overdue", risk_policy(), None)
            .unwrap();

        let mut policy = risk_policy();
        policy.logical_operator = LogicalOperator::Or;
        let updated = service
            .update(
                record.id,
                1,
                RecordChanges {
                    policy: Some(policy),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(
            service.format(&updated.policy),
            "Missed EMIs >= 3 OR Credit Score Drop > 50"
        );

        // A second writer still holding version 1 loses
        let err = service
            .update(
                record.id,
                1,
                RecordChanges {
                    name: Some("Stale".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(error_of(&err), Error::Conflict(_)));
        assert_eq!(service.get(record.id).unwrap().name, "Overdue");
    }

    #[test]
    fn test_disable_skips_validation_enable_does_not() {
        let service = service();
        let record = service
            .create(RecordKind::AutomationRule, "Rule", risk_policy(), None)
            .unwrap();

        let rejected = service
            .update(
                record.id,
                1,
                RecordChanges {
                    policy: Some(Policy::seed()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(error_of(&rejected), Error::Validation(_)));

        let off = service.set_enabled(record.id, 1, false).unwrap();
        assert!(!off.enabled);
        let draft = service
            .update(
                record.id,
                2,
                RecordChanges {
                    policy: Some(Policy::seed()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(draft.version, 3);

        let err = service.set_enabled(record.id, 3, true).unwrap_err();
        assert!(matches!(error_of(&err), Error::Validation(_)));
    }

    #[test]
    fn test_missing_records() {
        let service = service();
        let id = Uuid::new_v4();
        assert!(matches!(
            error_of(&service.get(id).unwrap_err()),
            Error::NotFound(_)
        ));
        assert!(matches!(
            error_of(&service.delete(id).unwrap_err()),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_zero_minimum_allows_empty_policies() {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        let service = PolicyService::new(Arc::new(repo), Arc::new(Catalogs::default()), 0);

        let empty = Policy::new(LogicalOperator::Or, vec![]);
        let record = service
            .create(RecordKind::Sla, "Placeholder", empty.clone(), None)
            .unwrap();

        let stored = service.get(record.id).unwrap();
        assert_eq!(stored.policy, empty);
        assert_eq!(service.describe(&stored).summary, "No conditions set");

        let off = service.set_enabled(record.id, 1, false).unwrap();
        let on = service.set_enabled(record.id, off.version, true).unwrap();
        assert!(on.enabled);
        assert_eq!(service.get(record.id).unwrap().policy, empty);
    }
}
