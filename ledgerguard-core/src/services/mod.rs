//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions.

pub mod logging;
pub mod migration;
mod policy;

pub use logging::{EntryPoint, KindCount, LogEntry, LogEvent, LogFilter, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use policy::{PolicyService, RecordChanges, RecordSummary};
