//! Collection names and field constants.

/// Collection holding schedule documents.
pub const SCHEDULE_COLLECTION: &str = "schedules";

/// Collection holding execution log documents.
pub const LOG_COLLECTION: &str = "executionLogs";

/// Schedules are listed newest-created first by this field.
pub const SCHEDULE_ORDER_FIELD: &str = "createdAt";

/// Logs are listed newest-executed first by this field.
pub const LOG_ORDER_FIELD: &str = "executionTime";

/// Field linking a log document to its schedule.
pub const LOG_JOB_ID_FIELD: &str = "jobId";
