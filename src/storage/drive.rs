use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{ObjectId, ObjectKey, ObjectStore};
use crate::credentials::AccessToken;
use crate::error::SyncError;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Google Drive v3 store rooted at one folder id.
///
/// Key directories map onto sub-folders, created on demand. A new file is
/// uploaded with its metadata and content in one `multipart/related` request
/// so it never exists empty; later writes go through update-by-id.
pub struct DriveStore {
    api_base: String,
    http: reqwest::Client,
    token: AccessToken,
    folder_id: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

impl DriveStore {
    pub fn new(api_base: impl Into<String>, http: reqwest::Client, token: AccessToken, folder_id: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
            token,
            folder_id: folder_id.into(),
        }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.api_base)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/drive/v3/files", self.api_base)
    }

    /// First non-trashed child of `parent` called `name`, oldest first.
    async fn find_child(&self, parent: &str, name: &str, folder: bool) -> Result<Option<String>, SyncError> {
        let mime_clause = if folder {
            format!("mimeType = '{FOLDER_MIME}'")
        } else {
            format!("mimeType != '{FOLDER_MIME}'")
        };
        let q = format!(
            "name = '{}' and '{}' in parents and trashed = false and {mime_clause}",
            escape_query(name),
            escape_query(parent)
        );

        let resp = self
            .http
            .get(self.files_url())
            .bearer_auth(self.token.secret())
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id)"),
                ("orderBy", "createdTime"),
                ("pageSize", "10"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await?;
        let list: FileList = decode(check(resp, "files.list").await?).await?;

        if list.files.len() > 1 {
            tracing::warn!(parent = %parent, name = %name, count = list.files.len(), "duplicate names in folder, using the oldest");
        }
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, parent: &str, name: &str) -> Result<String, SyncError> {
        let meta = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent],
        });
        let resp = self
            .http
            .post(self.files_url())
            .bearer_auth(self.token.secret())
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .json(&meta)
            .send()
            .await?;
        let created: FileRef = decode(check(resp, "files.create folder").await?).await?;
        tracing::info!(parent = %parent, name = %name, id = %created.id, "created drive folder");
        Ok(created.id)
    }

    /// Walk the key's directories. With `create`, missing folders are made.
    async fn resolve_dirs(&self, key: &ObjectKey, create: bool) -> Result<Option<String>, SyncError> {
        let mut parent = self.folder_id.clone();
        for dir in key.dirs() {
            parent = match self.find_child(&parent, dir, true).await? {
                Some(id) => id,
                None if create => self.create_folder(&parent, dir).await?,
                None => return Ok(None),
            };
        }
        Ok(Some(parent))
    }
}

#[async_trait]
impl ObjectStore for DriveStore {
    fn location(&self) -> &str {
        &self.folder_id
    }

    async fn lookup(&self, key: &ObjectKey) -> Result<Option<ObjectId>, SyncError> {
        let Some(parent) = self.resolve_dirs(key, false).await? else {
            return Ok(None);
        };
        Ok(self.find_child(&parent, key.file_name(), false).await?.map(ObjectId))
    }

    async fn download(&self, id: &ObjectId) -> Result<Vec<u8>, SyncError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.files_url(), id.0))
            .bearer_auth(self.token.secret())
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;
        let bytes = check(resp, "files.get media").await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn create(&self, key: &ObjectKey, body: Vec<u8>, content_type: &str) -> Result<ObjectId, SyncError> {
        let parent = self
            .resolve_dirs(key, true)
            .await?
            .ok_or_else(|| SyncError::Io(format!("could not resolve folders for {key}")))?;

        let meta = serde_json::json!({
            "name": key.file_name(),
            "parents": [parent],
            "mimeType": content_type,
        });
        let boundary = format!("book-sync-{}", uuid::Uuid::new_v4().simple());
        let payload = multipart_related(&boundary, &meta, content_type, &body);

        let resp = self
            .http
            .post(self.upload_url())
            .bearer_auth(self.token.secret())
            .query(&[("uploadType", "multipart"), ("fields", "id"), ("supportsAllDrives", "true")])
            .header(CONTENT_TYPE, format!("multipart/related; boundary={boundary}"))
            .body(payload)
            .send()
            .await?;
        let created: FileRef = decode(check(resp, "files.create").await?).await?;
        tracing::debug!(key = %key, id = %created.id, bytes = body.len(), "created drive file");
        Ok(ObjectId(created.id))
    }

    async fn replace(&self, id: &ObjectId, body: Vec<u8>, content_type: &str) -> Result<(), SyncError> {
        let len = body.len();
        let resp = self
            .http
            .patch(format!("{}/{}", self.upload_url(), id.0))
            .bearer_auth(self.token.secret())
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
            .header(CONTENT_TYPE, content_type.to_string())
            .body(body)
            .send()
            .await?;
        check(resp, "files.update").await?;
        tracing::debug!(id = %id, bytes = len, "replaced drive file");
        Ok(())
    }
}

fn escape_query(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related(boundary: &str, meta: &serde_json::Value, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 512);
    out.extend_from_slice(format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes());
    out.extend_from_slice(meta.to_string().as_bytes());
    out.extend_from_slice(format!("\r\n--{boundary}\r\nContent-Type: {content_type}\r\n\r\n").as_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    out
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, SyncError> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        let snippet: String = body.chars().take(256).collect();
        SyncError::Rejected {
            status: 200,
            body: format!("undecodable response: {e} body_snippet={snippet}"),
        }
    })
}

/// Pass 2xx through, classify everything else.
async fn check(resp: reqwest::Response, op: &str) -> Result<reqwest::Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify(op, status, &body))
}

fn classify(op: &str, status: StatusCode, body: &str) -> SyncError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let reasons: Vec<&str> = parsed
        .as_ref()
        .map(|b| b.error.errors.iter().map(|e| e.reason.as_str()).collect())
        .unwrap_or_default();
    let message = parsed
        .as_ref()
        .map(|b| b.error.message.clone())
        .unwrap_or_else(|| body.chars().take(256).collect());
    let detail = format!("{op}: {status} {message}");

    let quota = reasons.iter().any(|r| {
        matches!(
            *r,
            "storageQuotaExceeded" | "quotaExceeded" | "rateLimitExceeded" | "userRateLimitExceeded"
        )
    });

    match status {
        StatusCode::UNAUTHORIZED => SyncError::Auth(detail),
        StatusCode::FORBIDDEN if quota => SyncError::Quota(detail),
        StatusCode::FORBIDDEN => SyncError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => SyncError::Quota(detail),
        s if s.is_server_error() => SyncError::Network(detail),
        s => SyncError::Rejected {
            status: s.as_u16(),
            body: detail,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, body_string_contains, header, header_regex, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> DriveStore {
        DriveStore::new(server.uri(), crate::testutil::client(), AccessToken::new("tok"), "root-folder")
    }

    fn key(s: &str) -> ObjectKey {
        ObjectKey::new(s).unwrap()
    }

    fn child_query(parent: &str, name: &str, folder: bool) -> String {
        let op = if folder { "=" } else { "!=" };
        format!("name = '{name}' and '{parent}' in parents and trashed = false and mimeType {op} '{FOLDER_MIME}'")
    }

    /// Answer the files.list query for `name` under `parent`.
    async fn mount_list(server: &MockServer, parent: &str, name: &str, folder: bool, files: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("q", child_query(parent, name, folder)))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": files })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_query_escaping() {
        assert_eq!(escape_query("it's"), "it\\'s");
        assert_eq!(escape_query("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_error_classification() {
        let quota = r#"{"error":{"code":403,"message":"The user's Drive storage quota has been exceeded.","errors":[{"reason":"storageQuotaExceeded"}]}}"#;
        assert!(matches!(classify("x", StatusCode::FORBIDDEN, quota), SyncError::Quota(_)));

        let denied = r#"{"error":{"code":403,"message":"Insufficient permissions","errors":[{"reason":"insufficientFilePermissions"}]}}"#;
        assert!(matches!(classify("x", StatusCode::FORBIDDEN, denied), SyncError::Auth(_)));

        assert!(matches!(classify("x", StatusCode::UNAUTHORIZED, "nope"), SyncError::Auth(_)));
        assert!(matches!(classify("x", StatusCode::TOO_MANY_REQUESTS, ""), SyncError::Quota(_)));
        assert!(matches!(classify("x", StatusCode::BAD_GATEWAY, ""), SyncError::Network(_)));
        assert!(matches!(
            classify("x", StatusCode::NOT_FOUND, ""),
            SyncError::Rejected { status: 404, .. }
        ));
    }

    #[test]
    fn test_multipart_layout() {
        let meta = serde_json::json!({"name": "latest.json"});
        let body = multipart_related("B", &meta, "application/json", b"{}");
        let text = String::from_utf8(body).unwrap();
        assert_eq!(
            text,
            "--B\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"latest.json\"}\r\n--B\r\nContent-Type: application/json\r\n\r\n{}\r\n--B--\r\n"
        );
    }

    #[tokio::test]
    async fn test_lookup_walks_folders() {
        let server = MockServer::start().await;
        mount_list(&server, "root-folder", "BTC-USD", true, serde_json::json!([{"id": "dir1"}])).await;
        mount_list(&server, "dir1", "latest.json", false, serde_json::json!([{"id": "file9"}])).await;

        let id = store(&server).lookup(&key("BTC-USD/latest.json")).await.unwrap();
        assert_eq!(id, Some(ObjectId("file9".into())));
    }

    #[tokio::test]
    async fn test_lookup_takes_oldest_duplicate() {
        let server = MockServer::start().await;
        mount_list(
            &server,
            "root-folder",
            "latest.json",
            false,
            serde_json::json!([{"id": "old"}, {"id": "new"}]),
        )
        .await;
        let id = store(&server).lookup(&key("latest.json")).await.unwrap();
        assert_eq!(id, Some(ObjectId("old".into())));
    }

    #[tokio::test]
    async fn test_lookup_stops_at_missing_folder() {
        let server = MockServer::start().await;
        mount_list(&server, "root-folder", "BTC-USD", true, serde_json::json!([])).await;
        let id = store(&server).lookup(&key("BTC-USD/latest.json")).await.unwrap();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn test_create_makes_folder_then_uploads() {
        let server = MockServer::start().await;
        mount_list(&server, "root-folder", "BTC-USD", true, serde_json::json!([])).await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files"))
            .and(body_string_contains(FOLDER_MIME))
            .and(body_string_contains(r#""parents":["root-folder"]"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "newdir"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .and(header_regex("content-type", "^multipart/related; boundary=book-sync-"))
            .and(body_string_contains(r#""parents":["newdir"]"#))
            .and(body_string_contains(r#"{"a":1}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "newfile"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = store(&server)
            .create(&key("BTC-USD/latest.json"), b"{\"a\":1}".to_vec(), "application/json")
            .await
            .unwrap();
        assert_eq!(id, ObjectId("newfile".into()));
    }

    #[tokio::test]
    async fn test_replace_patches_media() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/upload/drive/v3/files/file9"))
            .and(query_param("uploadType", "media"))
            .and(header("content-type", "text/csv"))
            .and(body_string("new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "file9"})))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .replace(&ObjectId("file9".into()), b"new".to_vec(), "text/csv")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_download_reads_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/file9"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_string("timestamp_utc,best_bid,best_ask\n"))
            .mount(&server)
            .await;

        let bytes = store(&server).download(&ObjectId("file9".into())).await.unwrap();
        assert_eq!(bytes, b"timestamp_utc,best_bid,best_ask\n");
    }

    #[tokio::test]
    async fn test_expired_token_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"code": 401, "message": "Invalid Credentials", "errors": [{"reason": "authError"}]}
            })))
            .mount(&server)
            .await;

        let err = store(&server).lookup(&key("latest.json")).await.unwrap_err();
        assert!(matches!(err, SyncError::Auth(ref m) if m.contains("Invalid Credentials")), "{err}");
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn test_full_drive_is_quota_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/upload/drive/v3/files/file9"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "quota", "errors": [{"reason": "storageQuotaExceeded"}]}
            })))
            .mount(&server)
            .await;

        let err = store(&server)
            .replace(&ObjectId("file9".into()), b"x".to_vec(), "application/json")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Quota(_)), "{err}");
        assert!(err.is_retriable());
    }
}
