//! Ledgerguard Core - condition policies for finance automation records
//!
//! A policy is a list of field/operator/value conditions joined by a single
//! AND/OR operator. Automation rules, SLAs and permission policies all carry
//! one. This crate follows hexagonal architecture:
//!
//! - **domain**: Catalogs, conditions, policies, the builder, formatter and codec
//! - **ports**: Trait definitions for external dependencies (PolicyStore)
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;
pub mod log_migrations;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::PolicyService;

// Re-export commonly used types at crate root
pub use domain::{
    Catalogs, Condition, ConditionValue, LogicalOperator, Policy, PolicyBuilder, PolicyIssue,
    PolicyRecord, RecordKind,
};
pub use domain::result::{Error, OperationResult};
pub use services::{EntryPoint, LogEvent, LoggingService};

/// Database file inside the data directory
pub const DB_FILENAME: &str = "ledgerguard.duckdb";

/// Main context for Ledgerguard operations
///
/// This is the primary entry point for all business logic. It holds
/// the record store, configuration, and the policy service.
pub struct LedgerguardContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub policy_service: PolicyService,
}

impl LedgerguardContext {
    /// Create a new Ledgerguard context
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        let catalogs = Arc::new(config.catalogs()?);

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(DB_FILENAME))?);
        repository.ensure_schema()?;

        let policy_service = PolicyService::new(
            Arc::clone(&repository) as Arc<dyn ports::PolicyStore>,
            catalogs,
            config.min_conditions,
        );

        Ok(Self {
            config,
            repository,
            policy_service,
        })
    }
}
