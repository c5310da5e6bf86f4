//! End-to-end tests through `LedgerguardContext` with a real data directory

use tempfile::TempDir;

use ledgerguard_core::config::Config;
use ledgerguard_core::{
    Condition, EntryPoint, Error, LedgerguardContext, LogEvent, LoggingService, LogicalOperator,
    Policy, RecordKind, DB_FILENAME,
};

const CATALOG: &str = r#"{
    "fields": [
        {"id": "amount", "label": "Amount", "valueType": "number"},
        {"id": "channel", "label": "Channel", "valueType": "enum", "enumValues": ["web", "branch"]}
    ]
}"#;

#[test]
fn test_context_uses_configured_catalog_and_minimum() {
    let temp_dir = TempDir::new().unwrap();
    let catalog_path = temp_dir.path().join("catalog.json");
    std::fs::write(&catalog_path, CATALOG).unwrap();

    Config {
        catalog_path: Some(catalog_path),
        min_conditions: 2,
    }
    .save(temp_dir.path())
    .unwrap();

    let ctx = LedgerguardContext::new(temp_dir.path()).unwrap();
    assert!(temp_dir.path().join(DB_FILENAME).exists());
    assert_eq!(ctx.policy_service.min_conditions(), 2);

    let single = Policy::new(
        LogicalOperator::And,
        vec![Condition::new("amount", ">", 100)],
    );
    let err = ctx
        .policy_service
        .create(RecordKind::AutomationRule, "Too small", single, None)
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Validation(_))));

    let policy = Policy::new(
        LogicalOperator::Or,
        vec![
            Condition::new("amount", ">", 100),
            Condition::new("channel", "equals", "branch"),
        ],
    );
    let record = ctx
        .policy_service
        .create(RecordKind::AutomationRule, "Branch spend", policy, None)
        .unwrap();
    assert_eq!(
        ctx.policy_service.describe(&record).summary,
        "Amount > 100 OR Channel is branch"
    );

    // Built-in fields are unknown to the custom catalog
    let builtin = Policy::new(
        LogicalOperator::And,
        vec![
            Condition::new("grand_total", ">", 100),
            Condition::new("amount", "<", 5),
        ],
    );
    assert!(!ctx.policy_service.check(&builtin).is_empty());
}

#[test]
fn test_context_defaults_without_settings() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = LedgerguardContext::new(temp_dir.path()).unwrap();
    assert_eq!(ctx.config.min_conditions, 1);
    assert!(ctx.config.catalog_path.is_none());
    assert!(ctx.policy_service.catalogs().field("missed_emis").is_some());
}

#[test]
fn test_context_rejects_broken_catalog() {
    let temp_dir = TempDir::new().unwrap();
    let catalog_path = temp_dir.path().join("catalog.json");
    // Enum fields must list their values
    std::fs::write(
        &catalog_path,
        r#"{"fields": [{"id": "tier", "label": "Tier", "valueType": "enum"}]}"#,
    )
    .unwrap();
    Config {
        catalog_path: Some(catalog_path),
        min_conditions: 1,
    }
    .save(temp_dir.path())
    .unwrap();

    assert!(LedgerguardContext::new(temp_dir.path()).is_err());
}

#[test]
fn test_event_log_lives_beside_record_store() {
    let temp_dir = TempDir::new().unwrap();
    let _ctx = LedgerguardContext::new(temp_dir.path()).unwrap();

    let logger = LoggingService::new(temp_dir.path(), EntryPoint::Cli, "0.1.0").unwrap();
    logger
        .log(
            LogEvent::new("command")
                .with_command("policy new")
                .with_record_kind(RecordKind::Sla),
        )
        .unwrap();

    assert_eq!(logger.db_path(), temp_dir.path().join("logs.duckdb"));
    let entries = logger.get_recent(10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record_kind.as_deref(), Some("sla"));
    assert_eq!(entries[0].entry_point, "cli");
}
