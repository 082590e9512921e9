use serde::Serialize;
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::info;

use super::client::ChatLogUploader;
use super::error::{Result, UploadError};

/// Chat logs travel as JSON
pub const CHAT_LOG_CONTENT_TYPE: &str = "application/json";

/// Outcome of a completed upload, returned to the caller.
///
/// `byte_size` is the encoded UTF-8 length of the transported body, so
/// it always matches the `Content-Length` of the PUT. Serializes in
/// camelCase for CLI display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    pub object_key: String,
    pub file_name: String,
    pub upload_timestamp: String,
    pub byte_size: u64,
    pub metadata: Map<String, Value>,
}

impl ChatLogUploader {
    /// Upload a chat-log file from the local filesystem.
    ///
    /// Validates the path (existence, regular file, non-empty, within
    /// the size ceiling) before any network call, reads the full content
    /// into memory, derives the file name from the path, then proceeds
    /// as a content upload.
    pub async fn upload_from_path(
        &self,
        path: &Path,
        metadata: Map<String, Value>,
    ) -> Result<UploadResult> {
        info!("starting upload of chat log: {}", path.display());

        self.validate_local_file(path).await?;

        let content = tokio::fs::read_to_string(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::NotAFile {
                path: path.display().to_string(),
            })?;

        self.upload_from_content(&content, &file_name, metadata).await
    }

    /// Upload chat-log content directly, without a backing file.
    ///
    /// Requests a grant, PUTs the content to the granted URL, and
    /// returns the result with the caller's metadata passed through
    /// unchanged.
    pub async fn upload_from_content(
        &self,
        content: &str,
        file_name: &str,
        metadata: Map<String, Value>,
    ) -> Result<UploadResult> {
        info!("starting upload of chat log content: {file_name}");

        let grant = self
            .request_grant(
                file_name,
                CHAT_LOG_CONTENT_TYPE,
                self.options().presigned_url_expiry,
            )
            .await?;
        info!("generated presigned grant for: {}", grant.object_key);

        self.put_content(&grant, content.as_bytes(), CHAT_LOG_CONTENT_TYPE)
            .await?;
        info!("successfully uploaded chat log to storage: {}", grant.object_key);

        Ok(UploadResult {
            success: true,
            object_key: grant.object_key,
            file_name: file_name.to_string(),
            upload_timestamp: grant.issued_at,
            byte_size: content.len() as u64,
            metadata,
        })
    }

    /// Upload a synthetic two-message chat log against the configured
    /// endpoint. Used by the `--test` CLI mode.
    pub async fn run_integration_test(&self, environment: &str) -> Result<UploadResult> {
        info!("running chat log uploader test");

        let now = chrono::Utc::now();
        let timestamp = now.to_rfc3339();

        let payload = json!({
            "sessionId": format!("test-session-{}", now.timestamp_millis()),
            "timestamp": timestamp,
            "messages": [
                {
                    "role": "user",
                    "content": "Hello, this is a test message for storage integration.",
                    "timestamp": timestamp,
                },
                {
                    "role": "assistant",
                    "content": "This is a test response from the AI assistant.",
                    "timestamp": timestamp,
                },
            ],
            "metadata": {
                "testRun": true,
                "environment": environment,
            },
        });
        let content = serde_json::to_string_pretty(&payload)?;
        let file_name = format!("test-chat-log-{}.json", now.timestamp_millis());

        let mut metadata = Map::new();
        metadata.insert("testMode".to_string(), Value::Bool(true));
        metadata.insert("testTimestamp".to_string(), Value::String(timestamp));

        self.upload_from_content(&content, &file_name, metadata).await
    }

    async fn validate_local_file(&self, path: &Path) -> Result<()> {
        let stats = match tokio::fs::metadata(path).await {
            Ok(stats) => stats,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UploadError::NotFound {
                    path: path.display().to_string(),
                });
            }
            Err(e) => return Err(UploadError::Io(e)),
        };

        if !stats.is_file() {
            return Err(UploadError::NotAFile {
                path: path.display().to_string(),
            });
        }
        if stats.len() == 0 {
            return Err(UploadError::EmptyFile {
                path: path.display().to_string(),
            });
        }

        let max = self.options().max_file_size;
        if stats.len() > max {
            return Err(UploadError::TooLarge {
                size: stats.len(),
                max,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::client::UploaderOptions;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal single-purpose HTTP responder. Counts connections so
    /// tests can assert which network calls were (not) made.
    struct StubServer {
        addr: SocketAddr,
        hits: Arc<AtomicUsize>,
    }

    impl StubServer {
        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    async fn spawn_stub(status: u16, body: String) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hit_counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                hit_counter.fetch_add(1, Ordering::SeqCst);

                read_request(&mut socket).await;

                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-length: {}\r\netag: \"stub-etag\"\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        StubServer { addr, hits }
    }

    /// Drain headers plus the declared body before responding
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = vec![0u8; 64 * 1024];
        let mut read = 0;
        loop {
            let Ok(n) = socket.read(&mut buf[read..]).await else {
                return;
            };
            if n == 0 {
                return;
            }
            read += n;
            if let Some(end) = buf[..read].windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if read >= end + 4 + content_length {
                    return;
                }
            }
        }
    }

    fn test_uploader(function_url: &str) -> ChatLogUploader {
        let options = UploaderOptions {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            ..UploaderOptions::default()
        };
        ChatLogUploader::new(function_url, options).unwrap()
    }

    fn grant_body(put_url: &str) -> String {
        format!(r#"{{"objectKey":"chat-logs/t.json","url":"{put_url}","timestamp":"T"}}"#)
    }

    #[tokio::test]
    async fn upload_from_content_happy_path() {
        let put = spawn_stub(200, String::new()).await;
        let grant = spawn_stub(200, grant_body(&put.url("/put"))).await;

        let uploader = test_uploader(&grant.url("/"));
        let result = uploader
            .upload_from_content("{}", "t.json", Map::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.object_key, "chat-logs/t.json");
        assert_eq!(result.file_name, "t.json");
        assert_eq!(result.upload_timestamp, "T");
        assert_eq!(result.byte_size, 2);
        assert!(result.metadata.is_empty());
        assert_eq!(grant.hits(), 1);
        assert_eq!(put.hits(), 1);
    }

    #[tokio::test]
    async fn byte_size_counts_encoded_bytes_not_chars() {
        let put = spawn_stub(200, String::new()).await;
        let grant = spawn_stub(200, grant_body(&put.url("/put"))).await;

        let uploader = test_uploader(&grant.url("/"));
        // three characters, five bytes on the wire
        let result = uploader
            .upload_from_content("héé", "t.json", Map::new())
            .await
            .unwrap();

        assert_eq!(result.byte_size, 5);
    }

    #[tokio::test]
    async fn metadata_passes_through_unchanged() {
        let put = spawn_stub(200, String::new()).await;
        let grant = spawn_stub(200, grant_body(&put.url("/put"))).await;

        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("unit-test"));
        metadata.insert("attempt".to_string(), json!(1));

        let uploader = test_uploader(&grant.url("/"));
        let result = uploader
            .upload_from_content("{}", "t.json", metadata.clone())
            .await
            .unwrap();

        assert_eq!(result.metadata, metadata);
    }

    #[tokio::test]
    async fn grant_rejection_skips_put() {
        let put = spawn_stub(200, String::new()).await;
        let grant = spawn_stub(403, r#"{"error":"not allowed"}"#.to_string()).await;

        let uploader = test_uploader(&grant.url("/"));
        let err = uploader
            .upload_from_content("{}", "t.json", Map::new())
            .await
            .unwrap_err();

        match err {
            UploadError::Grant { message } => assert_eq!(message, "not allowed"),
            other => panic!("expected Grant, got {other:?}"),
        }
        assert_eq!(put.hits(), 0);
    }

    #[tokio::test]
    async fn malformed_grant_body_is_grant_error() {
        let grant = spawn_stub(200, "not json at all".to_string()).await;

        let uploader = test_uploader(&grant.url("/"));
        let err = uploader
            .upload_from_content("{}", "t.json", Map::new())
            .await
            .unwrap_err();

        match err {
            UploadError::Grant { message } => {
                assert!(message.contains("failed to parse grant response"));
            }
            other => panic!("expected Grant, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn storage_rejection_surfaces_status_and_body() {
        let put = spawn_stub(500, "boom".to_string()).await;
        let grant = spawn_stub(200, grant_body(&put.url("/put"))).await;

        let uploader = test_uploader(&grant.url("/"));
        let err = uploader
            .upload_from_content("{}", "t.json", Map::new())
            .await
            .unwrap_err();

        match err {
            UploadError::Storage { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Storage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_receipt_captures_etag() {
        let put = spawn_stub(200, String::new()).await;
        let grant_json = grant_body(&put.url("/put"));
        let grant: crate::uploader::PresignedGrant = serde_json::from_str(&grant_json).unwrap();

        let uploader = test_uploader("http://127.0.0.1:1/unused");
        let receipt = uploader
            .put_content(&grant, b"{}", CHAT_LOG_CONTENT_TYPE)
            .await
            .unwrap();

        assert_eq!(receipt.etag.as_deref(), Some("\"stub-etag\""));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        // bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let uploader = test_uploader(&format!("http://{addr}/"));
        let err = uploader
            .upload_from_content("{}", "t.json", Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Transport { .. }));
    }

    #[tokio::test]
    async fn timeout_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // accept and hold the connection without ever responding
            if let Ok((socket, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            }
        });

        let options = UploaderOptions {
            timeout: Duration::from_millis(300),
            ..UploaderOptions::default()
        };
        let uploader = ChatLogUploader::new(format!("http://{addr}/"), options).unwrap();
        let err = uploader
            .upload_from_content("{}", "t.json", Map::new())
            .await
            .unwrap_err();

        match err {
            UploadError::Transport { message } => assert!(message.contains("timeout")),
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_file_fails_before_any_network_call() {
        let grant = spawn_stub(200, "{}".to_string()).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "").unwrap();

        let uploader = test_uploader(&grant.url("/"));
        let err = uploader
            .upload_from_path(&path, Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::EmptyFile { .. }));
        assert_eq!(grant.hits(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let uploader = test_uploader("http://127.0.0.1:1/unused");
        let err = uploader
            .upload_from_path(Path::new("/definitely/not/there.json"), Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::NotFound { .. }));
    }

    #[tokio::test]
    async fn directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();

        let uploader = test_uploader("http://127.0.0.1:1/unused");
        let err = uploader
            .upload_from_path(dir.path(), Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::NotAFile { .. }));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_locally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.json");
        std::fs::write(&path, "12345").unwrap();

        let options = UploaderOptions {
            max_file_size: 4,
            ..UploaderOptions::default()
        };
        let uploader = ChatLogUploader::new("http://127.0.0.1:1/unused", options).unwrap();
        let err = uploader
            .upload_from_path(&path, Map::new())
            .await
            .unwrap_err();

        match err {
            UploadError::TooLarge { size, max } => {
                assert_eq!(size, 5);
                assert_eq!(max, 4);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_from_path_derives_file_name() {
        let put = spawn_stub(200, String::new()).await;
        let grant = spawn_stub(200, grant_body(&put.url("/put"))).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-42.json");
        std::fs::write(&path, r#"{"messages":[]}"#).unwrap();

        let uploader = test_uploader(&grant.url("/"));
        let result = uploader.upload_from_path(&path, Map::new()).await.unwrap();

        assert_eq!(result.file_name, "session-42.json");
        assert_eq!(result.byte_size, 15);
    }

    #[tokio::test]
    async fn integration_test_uploads_synthetic_log() {
        let put = spawn_stub(200, String::new()).await;
        let grant = spawn_stub(200, grant_body(&put.url("/put"))).await;

        let uploader = test_uploader(&grant.url("/"));
        let result = uploader.run_integration_test("dev").await.unwrap();

        assert!(result.success);
        assert!(result.file_name.starts_with("test-chat-log-"));
        assert!(result.file_name.ends_with(".json"));
        assert_eq!(result.metadata.get("testMode"), Some(&json!(true)));
        assert!(result.byte_size > 0);
    }
}
