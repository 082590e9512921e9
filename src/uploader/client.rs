use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use std::time::Duration;
use tracing::debug;

use super::error::{Result, UploadError};
use super::grant::{GrantRequest, GrantServiceError, PresignedGrant};
use crate::config::Settings;

/// Default per-request timeout when settings carry no override
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default local file-size ceiling (100 MiB)
const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

const DEFAULT_USER_AGENT: &str = "MediaViewer-v209-ChatLogUploader/1.0";

/// Tunables consumed by [`ChatLogUploader`] at construction time
#[derive(Debug, Clone)]
pub struct UploaderOptions {
    /// Per-request timeout for both the grant POST and the content PUT
    pub timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// `User-Agent` sent on every request
    pub user_agent: String,
    /// Local file-size ceiling checked before any network call
    pub max_file_size: u64,
    /// Grant lifetime requested from the endpoint, in seconds
    pub presigned_url_expiry: u64,
    /// Accepted from configuration but not acted on: every call is a
    /// single attempt
    #[allow(dead_code)]
    pub retry_attempts: u64,
    /// Accepted from configuration but not acted on
    #[allow(dead_code)]
    pub retry_delay: Duration,
    /// Accepted from configuration but not acted on: uploads run
    /// strictly sequentially
    #[allow(dead_code)]
    pub max_concurrent_uploads: u64,
}

impl Default for UploaderOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            presigned_url_expiry: super::grant::DEFAULT_GRANT_EXPIRY_SECS,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1_000),
            max_concurrent_uploads: 3,
        }
    }
}

impl UploaderOptions {
    /// Read the uploader tunables out of a merged settings tree
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();

        Self {
            timeout: Duration::from_millis(
                settings.get_u64("lambda.timeout").unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
            connect_timeout: Duration::from_millis(
                settings
                    .get_u64("client.connectTimeout")
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
            user_agent: settings
                .get_str("client.userAgent")
                .unwrap_or(defaults.user_agent),
            max_file_size: settings
                .get_u64("upload.maxFileSize")
                .unwrap_or(defaults.max_file_size),
            presigned_url_expiry: settings
                .get_u64("upload.presignedUrlExpiry")
                .unwrap_or(defaults.presigned_url_expiry),
            retry_attempts: settings
                .get_u64("lambda.retryAttempts")
                .unwrap_or(defaults.retry_attempts),
            retry_delay: Duration::from_millis(
                settings.get_u64("lambda.retryDelay").unwrap_or(1_000),
            ),
            max_concurrent_uploads: settings
                .get_u64("client.maxConcurrentUploads")
                .unwrap_or(defaults.max_concurrent_uploads),
        }
    }
}

/// Response detail of a successful content PUT
#[derive(Debug, Clone)]
pub struct PutReceipt {
    /// `etag` header from the storage backend, when present
    #[allow(dead_code)] // surfaced for callers; the CLI does not consume it
    pub etag: Option<String>,
}

/// Client for the two-phase upload protocol: request a presigned grant
/// from the configured endpoint, then PUT the content to the granted URL.
///
/// Strictly sequential: each upload is at most two outbound round-trips,
/// the PUT never starting before the grant request completes.
pub struct ChatLogUploader {
    client: reqwest::Client,
    function_url: String,
    options: UploaderOptions,
}

impl ChatLogUploader {
    /// Build an uploader against the given grant endpoint
    pub fn new(function_url: impl Into<String>, options: UploaderOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(options.user_agent.clone())
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| UploadError::Transport {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            function_url: function_url.into(),
            options,
        })
    }

    pub fn options(&self) -> &UploaderOptions {
        &self.options
    }

    /// Phase one: request a presigned grant from the endpoint.
    ///
    /// Any non-200 response maps to [`UploadError::Grant`] carrying the
    /// remote error text when the body provides one; an unparsable 200
    /// body maps to [`UploadError::Grant`] with the parse failure;
    /// connection failures and timeouts map to [`UploadError::Transport`].
    pub async fn request_grant(
        &self,
        file_name: &str,
        content_type: &str,
        expires_in: u64,
    ) -> Result<PresignedGrant> {
        let request = GrantRequest::upload(file_name, content_type, expires_in);
        let body = serde_json::to_vec(&request)?;

        let response = self
            .client
            .post(&self.function_url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, body.len())
            .body(body)
            .timeout(self.options.timeout)
            .send()
            .await
            .map_err(UploadError::from_request_error)?;

        let status = response.status();
        let data = response
            .text()
            .await
            .map_err(UploadError::from_request_error)?;

        if status != StatusCode::OK {
            let message = serde_json::from_str::<GrantServiceError>(&data)
                .ok()
                .and_then(GrantServiceError::into_message)
                .unwrap_or_else(|| format!("status {status}: {data}"));
            return Err(UploadError::Grant { message });
        }

        let grant: PresignedGrant = serde_json::from_str(&data).map_err(|e| {
            UploadError::Grant {
                message: format!("failed to parse grant response: {e}"),
            }
        })?;

        debug!(
            "grant for {} expires in {}s",
            grant.object_key, grant.expires_in
        );
        Ok(grant)
    }

    /// Phase two: PUT the content to the granted URL.
    ///
    /// A non-200 response maps to [`UploadError::Storage`] with the
    /// status code and response body; network failures and timeouts map
    /// to [`UploadError::Transport`].
    pub async fn put_content(
        &self,
        grant: &PresignedGrant,
        content: &[u8],
        content_type: &str,
    ) -> Result<PutReceipt> {
        let response = self
            .client
            .put(&grant.url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, content.len())
            .body(content.to_vec())
            .timeout(self.options.timeout)
            .send()
            .await
            .map_err(UploadError::from_request_error)?;

        let status = response.status();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .map_err(UploadError::from_request_error)?;
            return Err(UploadError::Storage {
                status: status.as_u16(),
                body,
            });
        }

        Ok(PutReceipt { etag })
    }
}
