//! The document store contract.

use async_trait::async_trait;

use crate::{Document, LogRecord, ScheduleFields, ScheduleRecord, StoreError};

/// A key-document store holding schedules and their execution logs.
///
/// Implementations own persisted state. Every call either applies completely
/// or returns an error; callers treat an error as "not applied".
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All schedules, newest-created first.
    async fn list_schedules(&self) -> Result<Vec<Document<ScheduleRecord>>, StoreError>;

    /// Persist a new schedule and return it with its assigned id.
    async fn create_schedule(
        &self,
        record: &ScheduleRecord,
    ) -> Result<Document<ScheduleRecord>, StoreError>;

    /// Apply a partial update to a schedule.
    async fn update_schedule(&self, id: &str, fields: &ScheduleFields) -> Result<(), StoreError>;

    /// Delete a schedule together with every log whose `jobId` matches it.
    ///
    /// Either both go or neither does.
    async fn delete_schedule(&self, id: &str) -> Result<(), StoreError>;

    /// All execution logs, newest-executed first.
    async fn list_logs(&self) -> Result<Vec<Document<LogRecord>>, StoreError>;

    /// Persist a new execution log and return it with its assigned id.
    async fn create_log(&self, record: &LogRecord) -> Result<Document<LogRecord>, StoreError>;
}
