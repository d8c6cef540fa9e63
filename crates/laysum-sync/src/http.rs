//! HTTP client for the annotation service's `/api` routes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use laysum_core::{AnnotationRecord, DocumentItem, Label, Scores};
use laysum_store::{AdminStore, AnnotationStore, StoreError, UserSettings};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("not signed in or session expired")]
    Unauthorized,
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SyncError> for StoreError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Server { status: 404, body } => StoreError::NotFound(body),
            SyncError::Json(e) => StoreError::Json(e),
            other => StoreError::Other(other.to_string()),
        }
    }
}

/// [`AnnotationStore`] backed by a remote annotation service.
///
/// The service identifies the user from the bearer token, so the `user`
/// arguments of the store traits are only used for logging and for the
/// admin `userId` parameter.
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct SummariesResponse {
    summaries: Vec<DocumentItem>,
}

#[derive(Deserialize)]
struct AnnotationResponse {
    annotation: Option<SavedAnnotation>,
}

/// A stored annotation as the service returns it. Labels may be null for
/// rows written before labelling existed.
#[derive(Deserialize)]
struct SavedAnnotation {
    #[serde(rename = "textSummaryId", default)]
    document_id: Option<String>,
    #[serde(flatten)]
    scores: Scores,
    #[serde(default)]
    labels: Option<Vec<Label>>,
}

impl SavedAnnotation {
    fn into_record(self, fallback_id: &str) -> AnnotationRecord {
        AnnotationRecord {
            document_id: self.document_id.unwrap_or_else(|| fallback_id.to_string()),
            scores: self.scores,
            labels: self.labels.unwrap_or_default(),
        }
    }
}

/// `GET /api/annotations` without `textId`: saved annotations keyed by
/// summary id.
#[derive(Deserialize)]
struct AnnotationsResponse {
    annotations: BTreeMap<String, SavedAnnotation>,
}

impl AnnotationsResponse {
    fn into_records(self) -> Vec<AnnotationRecord> {
        self.annotations
            .into_iter()
            .map(|(id, saved)| saved.into_record(&id))
            .collect()
    }
}

#[derive(Deserialize)]
struct UsersResponse {
    users: Vec<RemoteUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteUser {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    settings: Option<RemoteSettings>,
    #[serde(default)]
    is_admin: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSettings {
    summary_window_days: i32,
}

impl From<RemoteUser> for UserSettings {
    fn from(user: RemoteUser) -> Self {
        let mut settings = UserSettings::new(user.id, user.name.unwrap_or_default());
        settings.email = user.email;
        settings.is_admin = user.is_admin;
        if let Some(remote) = user.settings {
            settings.summary_window_days = remote.summary_window_days;
        }
        settings
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WindowUpdate<'a> {
    user_id: &'a str,
    summary_window_days: i32,
}

impl HttpStore {
    /// Create a client for the given service base URL.
    ///
    /// `base_url` should be like `http://localhost:3000` (a trailing slash is
    /// trimmed).
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SyncError> {
        let resp = self.authorized(request).send().await?;
        let body = Self::check(resp).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn check(resp: Response) -> Result<Response, SyncError> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    pub async fn fetch_summaries(&self) -> Result<Vec<DocumentItem>, SyncError> {
        let url = self.url("summaries");
        debug!(url = %url, "fetching assigned summaries");
        let resp: SummariesResponse = self.send(self.client.get(&url)).await?;
        info!(count = resp.summaries.len(), "fetched summaries");
        Ok(resp.summaries)
    }

    pub async fn fetch_annotation(
        &self,
        document_id: &str,
    ) -> Result<Option<AnnotationRecord>, SyncError> {
        let request = self
            .client
            .get(self.url("annotations"))
            .query(&[("textId", document_id)]);
        let resp: AnnotationResponse = self.send(request).await?;
        Ok(resp.annotation.map(|a| a.into_record(document_id)))
    }

    pub async fn submit(&self, record: &AnnotationRecord) -> Result<(), SyncError> {
        let url = self.url("annotate");
        info!(url = %url, document_id = %record.document_id, labels = record.labels.len(), "submitting annotation");
        let _: serde_json::Value = self.send(self.client.post(&url).json(record)).await?;
        Ok(())
    }
}

#[async_trait]
impl AnnotationStore for HttpStore {
    async fn assigned_documents(&self, _user: &str) -> Result<Vec<DocumentItem>, StoreError> {
        Ok(self.fetch_summaries().await?)
    }

    async fn load_annotation(
        &self,
        _user: &str,
        document_id: &str,
    ) -> Result<Option<AnnotationRecord>, StoreError> {
        Ok(self.fetch_annotation(document_id).await?)
    }

    async fn save_annotation(
        &self,
        _user: &str,
        record: &AnnotationRecord,
    ) -> Result<(), StoreError> {
        record.validate()?;
        // The service rejects unrated aspects.
        if !record.is_complete() {
            debug!(document_id = %record.document_id, "not sending incomplete annotation");
            return Err(StoreError::Incomplete(record.document_id.clone()));
        }
        Ok(self.submit(record).await?)
    }
}

#[async_trait]
impl AdminStore for HttpStore {
    async fn list_users(&self) -> Result<Vec<UserSettings>, StoreError> {
        let resp: UsersResponse = self.send(self.client.get(self.url("admin/users"))).await?;
        Ok(resp.users.into_iter().map(UserSettings::from).collect())
    }

    async fn set_summary_window(&self, user: &str, days: i32) -> Result<(), StoreError> {
        if days < 0 {
            return Err(StoreError::InvalidWindow(days));
        }
        let body = WindowUpdate {
            user_id: user,
            summary_window_days: days,
        };
        let request = self.client.post(self.url("admin/settings")).json(&body);
        let _: serde_json::Value = self.send(request).await?;
        info!(user, days, "summary window updated");
        Ok(())
    }

    /// Uses `/api/annotations`, which only honours `userId` when the token
    /// belongs to an admin and otherwise answers with the caller's own rows.
    async fn annotations_for_user(
        &self,
        caller: &str,
        target: Option<&str>,
    ) -> Result<Vec<AnnotationRecord>, StoreError> {
        let mut request = self.client.get(self.url("annotations"));
        if let Some(target) = target {
            request = request.query(&[("userId", target)]);
        }
        debug!(caller, ?target, "fetching annotations");
        let resp: AnnotationsResponse = self.send(request).await?;
        Ok(resp.into_records())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laysum_core::{Annotation, LabelCategory};

    #[test]
    fn trims_trailing_slash() {
        let store = HttpStore::new("http://localhost:3000/", None);
        assert_eq!(store.base_url, "http://localhost:3000");
        assert_eq!(store.url("annotate"), "http://localhost:3000/api/annotate");
        assert_eq!(
            store.url("/admin/users"),
            "http://localhost:3000/api/admin/users"
        );
    }

    #[test]
    fn submit_body_shape() {
        let mut annotation = Annotation::new();
        annotation.scores = Scores::new(3, 2, 4, 5);
        annotation.labels.add(
            LabelCategory::Hallucination,
            "cured",
            10,
            15,
            Some("helped".into()),
        );
        let json = serde_json::to_value(annotation.to_record("t1")).unwrap();
        assert_eq!(json["textId"], "t1");
        assert_eq!(json["factuality"], 4);
        let label = &json["labels"][0];
        assert_eq!(label["type"], "Hallucination");
        assert_eq!(label["text"], "cured");
        assert_eq!(label["correctedText"], "helped");
        assert_eq!(label["startIndex"], 10);
        assert_eq!(label["endIndex"], 15);
    }

    #[test]
    fn annotation_response_null_and_present() {
        let empty: AnnotationResponse = serde_json::from_str(r#"{"annotation": null}"#).unwrap();
        assert!(empty.annotation.is_none());

        let json = r#"{"annotation": {
            "comprehensiveness": 3, "layness": 2, "factuality": 4, "usefulness": 5,
            "labels": [{"type": "Omission", "text": "drug", "startIndex": 4, "endIndex": 8}]
        }}"#;
        let resp: AnnotationResponse = serde_json::from_str(json).unwrap();
        let record = resp.annotation.unwrap().into_record("t1");
        assert_eq!(record.document_id, "t1");
        assert_eq!(record.scores, Scores::new(3, 2, 4, 5));
        assert_eq!(record.labels[0].category, LabelCategory::Omission);
        assert!(record.labels[0].corrected_text.is_none());
    }

    #[test]
    fn null_labels_become_empty() {
        let json = r#"{"annotation": {
            "comprehensiveness": 1, "layness": 1, "factuality": 1, "usefulness": 1,
            "labels": null
        }}"#;
        let resp: AnnotationResponse = serde_json::from_str(json).unwrap();
        assert!(resp.annotation.unwrap().into_record("t").labels.is_empty());
    }

    #[test]
    fn summaries_response() {
        let json = r#"{"summaries": [
            {"id": "a", "text": "Source.", "summary": "Sum.", "level": 1, "model": "m",
             "assigned_at": "2025-03-01T00:00:00.000Z", "completed": true},
            {"id": "b", "text": "Source.", "summary": "Other."}
        ]}"#;
        let resp: SummariesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.summaries.len(), 2);
        assert!(resp.summaries[0].completed);
        assert!(resp.summaries[0].assigned_at.is_some());
        assert!(!resp.summaries[1].completed);
    }

    #[test]
    fn admin_users_response() {
        let json = r#"{"users": [
            {"id": "u1", "name": "Ann", "email": "ann@example.org", "settings": {"summaryWindowDays": 3}},
            {"id": "u2", "name": null, "email": "b@example.org", "settings": null}
        ]}"#;
        let resp: UsersResponse = serde_json::from_str(json).unwrap();
        let users: Vec<UserSettings> = resp.users.into_iter().map(UserSettings::from).collect();
        assert_eq!(users[0].summary_window_days, 3);
        assert_eq!(users[1].summary_window_days, 7);
        assert_eq!(users[1].name, "");
    }

    #[test]
    fn annotations_keyed_by_summary_id() {
        let json = r#"{"annotations": {
            "t9": {"comprehensiveness": 1, "layness": 2, "factuality": 3, "usefulness": 4,
                   "labels": []},
            "t2": {"comprehensiveness": 5, "layness": 5, "factuality": 5, "usefulness": 5,
                   "labels": null}
        }}"#;
        let resp: AnnotationsResponse = serde_json::from_str(json).unwrap();
        let records = resp.into_records();
        let ids: Vec<_> = records.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(ids, ["t2", "t9"]);
        assert_eq!(records[1].scores, Scores::new(1, 2, 3, 4));
        assert!(records[0].labels.is_empty());
    }

    /// Serve one canned JSON response and hand back the request head.
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut head = Vec::new();
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn other_users_annotations_go_through_owner_checked_route() {
        let (url, server) = serve_once(r#"{"annotations": {}}"#).await;
        let store = HttpStore::new(url, Some("tok".into()));
        let records = store.annotations_for_user("ann", Some("root")).await.unwrap();
        assert!(records.is_empty());

        let head = server.await.unwrap();
        let request_line = head.lines().next().unwrap();
        assert_eq!(request_line, "GET /api/annotations?userId=root HTTP/1.1");
        assert!(!head.contains("/admin/"));
        assert!(head.to_ascii_lowercase().contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn own_annotations_send_no_user_id() {
        let (url, server) = serve_once(r#"{"annotations": {}}"#).await;
        let store = HttpStore::new(url, None);
        store.annotations_for_user("ann", None).await.unwrap();
        let head = server.await.unwrap();
        assert_eq!(head.lines().next().unwrap(), "GET /api/annotations HTTP/1.1");
    }

    #[tokio::test]
    async fn incomplete_annotation_is_not_sent() {
        // Nothing listens here; an attempted request would surface as Other.
        let store = HttpStore::new("http://127.0.0.1:9", None);
        let mut annotation = Annotation::new();
        annotation.scores.factuality = 4;
        let err = store
            .save_annotation("ann", &annotation.to_record("t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Incomplete(id) if id == "t1"));
    }

    #[test]
    fn window_update_body() {
        let body = WindowUpdate {
            user_id: "u1",
            summary_window_days: 10,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["summaryWindowDays"], 10);
    }

    #[test]
    fn errors_map_into_store_errors() {
        let not_found: StoreError = SyncError::Server {
            status: 404,
            body: "missing".into(),
        }
        .into();
        assert!(matches!(not_found, StoreError::NotFound(_)));
        let unauthorized: StoreError = SyncError::Unauthorized.into();
        assert!(unauthorized.to_string().contains("not signed in"));
    }
}
