//! HTTP document store client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    Document, DocumentStore, LOG_COLLECTION, LOG_JOB_ID_FIELD, LOG_ORDER_FIELD,
    ListDocumentsResponse, LogRecord, SCHEDULE_COLLECTION, SCHEDULE_ORDER_FIELD, ScheduleFields,
    ScheduleRecord, StoreError,
};

/// Retries after the initial attempt for transient failures.
const MAX_RETRIES: u32 = 3;

/// First backoff delay; doubles on every retry (500ms, 1s, 2s).
const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);

/// Documents requested per page when listing.
const PAGE_SIZE: u32 = 100;

/// A single write in an atomic commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitWrite {
    /// Delete the document at `collection/id`.
    Delete(String),
}

impl CommitWrite {
    /// Delete `id` from `collection`.
    pub fn delete(collection: &str, id: &str) -> Self {
        CommitWrite::Delete(format!("{}/{}", collection, id))
    }
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    writes: &'a [CommitWrite],
}

/// Error body returned by the store server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// Client for a JSON-over-HTTP document store.
pub struct HttpStore {
    http: Client,
    base_url: String,
    token: Option<String>,
    retry_base: Duration,
}

impl HttpStore {
    /// Create a new client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            retry_base: DEFAULT_RETRY_BASE,
        })
    }

    /// Send a bearer token with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Override the first retry delay.
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/v1/{}", self.base_url, collection)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, collection, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request, retrying transient failures with exponential backoff.
    ///
    /// `build` is called once per attempt. Non-success statuses are mapped to
    /// [`StoreError`]s; `collection` and `id` only label `NotFound`.
    ///
    /// A non-idempotent request is only resent when it never reached the
    /// server: a timeout or 5xx may follow a committed write.
    async fn execute<F>(
        &self,
        operation: &str,
        collection: &str,
        id: &str,
        idempotent: bool,
        build: F,
    ) -> Result<Response, StoreError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            let result = match self.authorize(build()).send().await {
                Ok(response) => Self::check_status(response, collection, id).await,
                Err(e) => Err(StoreError::Http(e)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(ref e)
                    if attempt < MAX_RETRIES
                        && (e.is_unsent() || (idempotent && e.is_transient())) =>
                {
                    let backoff = self.retry_base * (1 << attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient store error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    last_error = Some(result);
                }
                Err(_) => return result,
            }
        }

        last_error.unwrap_or_else(|| Err(StoreError::InvalidResponse("retry exhausted".into())))
    }

    async fn check_status(
        response: Response,
        collection: &str,
        id: &str,
    ) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(StoreError::RateLimited { retry_after_secs });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        let text = response.text().await.map_err(|e| {
            StoreError::InvalidResponse(format!(
                "request failed ({}): failed to read response: {}",
                status, e
            ))
        })?;

        if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
            return Err(StoreError::Server {
                status: status.as_u16(),
                error: body.error,
                message: body.message,
            });
        }

        Err(StoreError::Server {
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("unknown").to_string(),
            message: text,
        })
    }

    /// Fetch every page of a listing.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<Document<T>>, StoreError> {
        let url = self.collection_url(collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = params.to_vec();
            query.push(("pageSize", PAGE_SIZE.to_string()));
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .execute("list", collection, "", true, || {
                    self.http.get(&url).query(&query)
                })
                .await?;
            let page: ListDocumentsResponse<T> = response.json().await?;
            documents.extend(page.documents);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(collection, count = documents.len(), "listed documents");
        Ok(documents)
    }

    /// List a collection ordered by `order_field`, descending.
    pub async fn list_documents<T: DeserializeOwned>(
        &self,
        collection: &str,
        order_field: &str,
    ) -> Result<Vec<Document<T>>, StoreError> {
        self.fetch_all(
            collection,
            &[
                ("orderBy", order_field.to_string()),
                ("direction", "desc".to_string()),
            ],
        )
        .await
    }

    /// List the documents whose `field` equals `value`.
    pub async fn query_documents<T: DeserializeOwned>(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document<T>>, StoreError> {
        self.fetch_all(
            collection,
            &[("where", field.to_string()), ("equals", value.to_string())],
        )
        .await
    }

    /// Create a document; the server assigns the id.
    ///
    /// Not retried after the request was sent, so a failure here may still
    /// have created the document.
    pub async fn create_document<T: Serialize + DeserializeOwned>(
        &self,
        collection: &str,
        fields: &T,
    ) -> Result<Document<T>, StoreError> {
        let url = self.collection_url(collection);
        let response = self
            .execute("create", collection, "", false, || {
                self.http.post(&url).json(fields)
            })
            .await?;
        let doc: Document<T> = response.json().await?;
        debug!(collection, id = %doc.id, "created document");
        Ok(doc)
    }

    /// Merge `fields` into an existing document.
    pub async fn patch_document<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        fields: &T,
    ) -> Result<(), StoreError> {
        let url = self.document_url(collection, id);
        self.execute("patch", collection, id, true, || {
            self.http.patch(&url).json(fields)
        })
        .await?;
        debug!(collection, id, "patched document");
        Ok(())
    }

    /// Apply a batch of writes atomically.
    pub async fn commit(&self, writes: &[CommitWrite]) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Err(StoreError::InvalidResponse(
                "commit requires at least one write".to_string(),
            ));
        }

        let url = format!("{}/v1:commit", self.base_url);
        let body = CommitRequest { writes };
        self.execute("commit", "", "", true, || self.http.post(&url).json(&body))
            .await?;
        debug!(writes = writes.len(), "committed batch");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn list_schedules(&self) -> Result<Vec<Document<ScheduleRecord>>, StoreError> {
        self.list_documents(SCHEDULE_COLLECTION, SCHEDULE_ORDER_FIELD)
            .await
    }

    async fn create_schedule(
        &self,
        record: &ScheduleRecord,
    ) -> Result<Document<ScheduleRecord>, StoreError> {
        self.create_document(SCHEDULE_COLLECTION, record).await
    }

    async fn update_schedule(&self, id: &str, fields: &ScheduleFields) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.patch_document(SCHEDULE_COLLECTION, id, fields).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_schedule(&self, id: &str) -> Result<(), StoreError> {
        // Only ids are needed, so tolerate log documents of any shape
        let logs: Vec<Document<serde_json::Value>> = self
            .query_documents(LOG_COLLECTION, LOG_JOB_ID_FIELD, id)
            .await?;

        let mut writes: Vec<CommitWrite> = logs
            .iter()
            .map(|doc| CommitWrite::delete(LOG_COLLECTION, &doc.id))
            .collect();
        writes.push(CommitWrite::delete(SCHEDULE_COLLECTION, id));

        self.commit(&writes).await
    }

    async fn list_logs(&self) -> Result<Vec<Document<LogRecord>>, StoreError> {
        self.list_documents(LOG_COLLECTION, LOG_ORDER_FIELD).await
    }

    async fn create_log(&self, record: &LogRecord) -> Result<Document<LogRecord>, StoreError> {
        self.create_document(LOG_COLLECTION, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogStatus, ScheduleType, StoreTimestamp};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_store(server: &MockServer) -> HttpStore {
        HttpStore::new(server.uri())
            .unwrap()
            .with_retry_base(Duration::from_millis(1))
    }

    fn schedule_json(name: &str) -> serde_json::Value {
        json!({
            "jobName": name,
            "type": "Daily",
            "startTime": "09:00",
            "isEnabled": true,
            "nextRun": { "seconds": 1_700_000_000, "nanos": 0 },
            "createdAt": { "seconds": 1_600_000_000, "nanos": 0 }
        })
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = HttpStore::new("https://store.example.com/").unwrap();
        assert_eq!(store.base_url(), "https://store.example.com");
        assert_eq!(
            store.document_url(SCHEDULE_COLLECTION, "abc"),
            "https://store.example.com/v1/schedules/abc"
        );
    }

    #[test]
    fn test_commit_write_shape() {
        let write = CommitWrite::delete(LOG_COLLECTION, "l1");
        assert_eq!(
            serde_json::to_value(&write).unwrap(),
            json!({ "delete": "executionLogs/l1" })
        );
    }

    #[tokio::test]
    async fn test_list_schedules_orders_and_paginates() {
        let mock_server = MockServer::start().await;

        // Second page is matched by its token; mounted first so it wins
        Mock::given(method("GET"))
            .and(path("/v1/schedules"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{ "id": "s2", "fields": schedule_json("second") }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/schedules"))
            .and(query_param("orderBy", "createdAt"))
            .and(query_param("direction", "desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{ "id": "s1", "fields": schedule_json("first") }],
                "nextPageToken": "p2"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let docs = store.list_schedules().await.unwrap();

        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(docs[0].fields.job_name, "first");
        assert_eq!(docs[0].fields.schedule_type, ScheduleType::Daily);
    }

    #[tokio::test]
    async fn test_create_log_returns_assigned_id() {
        let mock_server = MockServer::start().await;

        let record = LogRecord {
            job_id: "s1".to_string(),
            job_name: "Backup".to_string(),
            execution_time: StoreTimestamp { seconds: 42, nanos: 0 },
            message: "Executed \"Hello World\"".to_string(),
            status: LogStatus::Success,
        };

        Mock::given(method("POST"))
            .and(path("/v1/executionLogs"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_json(serde_json::to_value(&record).unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "log-1",
                "fields": serde_json::to_value(&record).unwrap()
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server).with_token("secret");
        let doc = store.create_log(&record).await.unwrap();
        assert_eq!(doc.id, "log-1");
        assert_eq!(doc.fields, record);
    }

    #[tokio::test]
    async fn test_update_sends_null_to_clear_next_run() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/v1/schedules/s1"))
            .and(body_json(json!({ "isEnabled": false, "nextRun": null })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        store
            .update_schedule(
                "s1",
                &ScheduleFields {
                    is_enabled: Some(false),
                    next_run: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/v1/schedules/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let err = store
            .update_schedule(
                "nope",
                &ScheduleFields {
                    is_enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        match err {
            StoreError::NotFound { collection, id } => {
                assert_eq!(collection, "schedules");
                assert_eq!(id, "nope");
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_commits_logs_and_schedule_together() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/executionLogs"))
            .and(query_param("where", "jobId"))
            .and(query_param("equals", "s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [
                    { "id": "l1", "fields": {} },
                    { "id": "l2", "fields": {} }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1:commit"))
            .and(body_json(json!({
                "writes": [
                    { "delete": "executionLogs/l1" },
                    { "delete": "executionLogs/l2" },
                    { "delete": "schedules/s1" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        store.delete_schedule("s1").await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/executionLogs"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/executionLogs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documents": [] })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let logs = store.list_logs().await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_create_is_not_resent_after_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/schedules"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let record: ScheduleRecord = serde_json::from_value(schedule_json("once")).unwrap();
        let err = store.create_schedule(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Server { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_server_error_body_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/schedules"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "InvalidArgument",
                "message": "jobName is required"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let record: ScheduleRecord = serde_json::from_value(schedule_json("x")).unwrap();
        let err = store.create_schedule(&record).await.unwrap_err();

        match err {
            StoreError::Server {
                status,
                error,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(error, "InvalidArgument");
                assert_eq!(message, "jobName is required");
            }
            other => panic!("expected Server error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_reports_retry_after() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/schedules"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let err = store.list_schedules().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
    }
}
