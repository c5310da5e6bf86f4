//! Record store port

use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{PolicyRecord, RecordKind};

/// Persistence for policy-bearing records
///
/// Updates are optimistic: the caller passes the version it read and the
/// store refuses the write with `Error::Conflict` if someone else got there
/// first.
pub trait PolicyStore: Send + Sync {
    /// Insert a new record
    fn insert_record(&self, record: &PolicyRecord) -> Result<()>;

    /// Get a record by ID
    fn get_record(&self, id: Uuid) -> Result<Option<PolicyRecord>>;

    /// List records, optionally of a single kind, ordered by creation time
    fn list_records(&self, kind: Option<RecordKind>) -> Result<Vec<PolicyRecord>>;

    /// Overwrite a record if it is still at `expected_version`
    ///
    /// Returns the stored record with its bumped version.
    fn update_record(&self, record: &PolicyRecord, expected_version: i64) -> Result<PolicyRecord>;

    /// Delete a record, returning whether it existed
    fn delete_record(&self, id: Uuid) -> Result<bool>;
}
