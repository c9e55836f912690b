//! In-process document store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{
    Document, DocumentStore, LOG_COLLECTION, LogRecord, SCHEDULE_COLLECTION, ScheduleFields,
    ScheduleRecord, StoreError,
};

#[derive(Default)]
struct Collections {
    schedules: Vec<Document<ScheduleRecord>>,
    logs: Vec<Document<LogRecord>>,
}

/// A [`DocumentStore`] kept entirely in memory.
///
/// Ids are random UUIDs. A single lock guards both collections, so the
/// cascading delete is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored schedules.
    pub async fn schedule_count(&self) -> usize {
        self.inner.read().await.schedules.len()
    }

    /// Number of stored logs.
    pub async fn log_count(&self) -> usize {
        self.inner.read().await.logs.len()
    }

    /// Fetch a schedule by id.
    pub async fn get_schedule(&self, id: &str) -> Option<Document<ScheduleRecord>> {
        self.inner
            .read()
            .await
            .schedules
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    fn new_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_schedules(&self) -> Result<Vec<Document<ScheduleRecord>>, StoreError> {
        let inner = self.inner.read().await;
        // Reverse first so ties keep the most recent insert on top
        let mut docs: Vec<_> = inner.schedules.iter().rev().cloned().collect();
        docs.sort_by(|a, b| b.fields.created_at.cmp(&a.fields.created_at));
        Ok(docs)
    }

    async fn create_schedule(
        &self,
        record: &ScheduleRecord,
    ) -> Result<Document<ScheduleRecord>, StoreError> {
        let doc = Document {
            id: Self::new_id(),
            fields: record.clone(),
        };
        self.inner.write().await.schedules.push(doc.clone());
        debug!(collection = SCHEDULE_COLLECTION, id = %doc.id, "created document");
        Ok(doc)
    }

    async fn update_schedule(&self, id: &str, fields: &ScheduleFields) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .schedules
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound {
                collection: SCHEDULE_COLLECTION.to_string(),
                id: id.to_string(),
            })?;
        doc.fields.apply(fields);
        Ok(())
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.schedules.iter().any(|d| d.id == id) {
            return Err(StoreError::NotFound {
                collection: SCHEDULE_COLLECTION.to_string(),
                id: id.to_string(),
            });
        }

        inner.schedules.retain(|d| d.id != id);
        let before = inner.logs.len();
        inner.logs.retain(|d| d.fields.job_id != id);
        debug!(
            id,
            logs_deleted = before - inner.logs.len(),
            "deleted schedule and its logs"
        );
        Ok(())
    }

    async fn list_logs(&self) -> Result<Vec<Document<LogRecord>>, StoreError> {
        let inner = self.inner.read().await;
        let mut docs: Vec<_> = inner.logs.iter().rev().cloned().collect();
        docs.sort_by(|a, b| b.fields.execution_time.cmp(&a.fields.execution_time));
        Ok(docs)
    }

    async fn create_log(&self, record: &LogRecord) -> Result<Document<LogRecord>, StoreError> {
        let doc = Document {
            id: Self::new_id(),
            fields: record.clone(),
        };
        self.inner.write().await.logs.push(doc.clone());
        debug!(collection = LOG_COLLECTION, id = %doc.id, "created document");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogStatus, ScheduleType, StoreTimestamp};

    fn schedule(name: &str, created: i64) -> ScheduleRecord {
        ScheduleRecord {
            job_name: name.to_string(),
            schedule_type: ScheduleType::Daily,
            start_time: "09:00".to_string(),
            interval: None,
            days_of_week: vec![],
            is_enabled: true,
            next_run: Some(StoreTimestamp {
                seconds: created + 100,
                nanos: 0,
            }),
            created_at: StoreTimestamp {
                seconds: created,
                nanos: 0,
            },
        }
    }

    fn log(job_id: &str, at: i64) -> LogRecord {
        LogRecord {
            job_id: job_id.to_string(),
            job_name: "job".to_string(),
            execution_time: StoreTimestamp { seconds: at, nanos: 0 },
            message: "Executed \"Hello World\"".to_string(),
            status: LogStatus::Success,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_unique_ids() {
        let store = MemoryStore::new();
        let a = store.create_schedule(&schedule("a", 1)).await.unwrap();
        let b = store.create_schedule(&schedule("b", 2)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.schedule_count().await, 2);
    }

    #[tokio::test]
    async fn test_list_schedules_newest_first() {
        let store = MemoryStore::new();
        store.create_schedule(&schedule("old", 10)).await.unwrap();
        store.create_schedule(&schedule("new", 30)).await.unwrap();
        store.create_schedule(&schedule("mid", 20)).await.unwrap();

        let names: Vec<_> = store
            .list_schedules()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.fields.job_name)
            .collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_list_logs_newest_first() {
        let store = MemoryStore::new();
        store.create_log(&log("x", 5)).await.unwrap();
        store.create_log(&log("x", 50)).await.unwrap();
        store.create_log(&log("x", 25)).await.unwrap();

        let times: Vec<_> = store
            .list_logs()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.fields.execution_time.seconds)
            .collect();
        assert_eq!(times, vec![50, 25, 5]);
    }

    #[tokio::test]
    async fn test_update_applies_partial_fields() {
        let store = MemoryStore::new();
        let doc = store.create_schedule(&schedule("a", 1)).await.unwrap();

        store
            .update_schedule(
                &doc.id,
                &ScheduleFields {
                    is_enabled: Some(false),
                    next_run: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = store.get_schedule(&doc.id).await.unwrap();
        assert!(!stored.fields.is_enabled);
        assert!(stored.fields.next_run.is_none());
        assert_eq!(stored.fields.job_name, "a");
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_schedule("missing", &ScheduleFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_logs() {
        let store = MemoryStore::new();
        let keep = store.create_schedule(&schedule("keep", 1)).await.unwrap();
        let gone = store.create_schedule(&schedule("gone", 2)).await.unwrap();
        store.create_log(&log(&keep.id, 1)).await.unwrap();
        store.create_log(&log(&gone.id, 2)).await.unwrap();
        store.create_log(&log(&gone.id, 3)).await.unwrap();

        store.delete_schedule(&gone.id).await.unwrap();

        assert_eq!(store.schedule_count().await, 1);
        let logs = store.list_logs().await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].fields.job_id, keep.id);
    }

    #[tokio::test]
    async fn test_delete_unknown_leaves_logs() {
        let store = MemoryStore::new();
        store.create_log(&log("orphan", 1)).await.unwrap();

        let err = store.delete_schedule("orphan").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.log_count().await, 1);
    }
}
