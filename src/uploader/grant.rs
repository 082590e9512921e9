//! Wire types for the presigned-grant contract.
//!
//! The grant service is an opaque HTTP endpoint (a Lambda function URL in
//! production). Canonical response fields are `objectKey`, `url` and
//! `timestamp`; the decoder also accepts the legacy `s3Key` and
//! `presignedUrl` names still emitted by older deployments.

use serde::{Deserialize, Serialize};

/// Grant lifetime requested when the caller supplies none
pub const DEFAULT_GRANT_EXPIRY_SECS: u64 = 3_600;

/// Body of the `POST` to the grant endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub action: &'static str,
    pub file_name: String,
    pub content_type: String,
    pub expires_in: u64,
}

impl GrantRequest {
    /// Build an upload-grant request
    pub fn upload(file_name: &str, content_type: &str, expires_in: u64) -> Self {
        Self {
            action: "upload",
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            expires_in,
        }
    }
}

/// A time-limited, single-use authorization to PUT one object.
///
/// Must be consumed before `expires_in` elapses or the transfer fails
/// at the storage backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedGrant {
    /// Object key within the bucket namespace
    #[serde(alias = "s3Key")]
    pub object_key: String,

    /// URL authorizing exactly one HTTP PUT
    #[serde(alias = "presignedUrl")]
    pub url: String,

    /// Issuance timestamp as reported by the service
    #[serde(rename = "timestamp", alias = "issuedAt")]
    pub issued_at: String,

    /// Seconds until the grant expires
    #[serde(default = "default_expiry")]
    pub expires_in: u64,
}

fn default_expiry() -> u64 {
    DEFAULT_GRANT_EXPIRY_SECS
}

/// Error payload returned by the grant service on rejection
#[derive(Debug, Deserialize)]
pub struct GrantServiceError {
    pub error: Option<String>,
    pub message: Option<String>,
}

impl GrantServiceError {
    /// Remote error text, preferring the `error` field
    pub fn into_message(self) -> Option<String> {
        self.error.or(self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_request_serializes_camel_case() {
        let request = GrantRequest::upload("chat.json", "application/json", 3600);
        let encoded = serde_json::to_value(&request).unwrap();

        assert_eq!(
            encoded,
            serde_json::json!({
                "action": "upload",
                "fileName": "chat.json",
                "contentType": "application/json",
                "expiresIn": 3600,
            })
        );
    }

    #[test]
    fn grant_decodes_canonical_fields() {
        let grant: PresignedGrant = serde_json::from_str(
            r#"{"objectKey":"chat-logs/t.json","url":"https://stub/put","timestamp":"T","expiresIn":900}"#,
        )
        .unwrap();

        assert_eq!(grant.object_key, "chat-logs/t.json");
        assert_eq!(grant.url, "https://stub/put");
        assert_eq!(grant.issued_at, "T");
        assert_eq!(grant.expires_in, 900);
    }

    #[test]
    fn grant_accepts_legacy_aliases_and_defaults_expiry() {
        let grant: PresignedGrant = serde_json::from_str(
            r#"{"s3Key":"chat-logs/a.json","presignedUrl":"https://stub/a","timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(grant.object_key, "chat-logs/a.json");
        assert_eq!(grant.url, "https://stub/a");
        assert_eq!(grant.expires_in, DEFAULT_GRANT_EXPIRY_SECS);
    }

    #[test]
    fn service_error_prefers_error_field() {
        let rejection: GrantServiceError =
            serde_json::from_str(r#"{"error":"denied","message":"other"}"#).unwrap();
        assert_eq!(rejection.into_message().as_deref(), Some("denied"));

        let rejection: GrantServiceError =
            serde_json::from_str(r#"{"message":"only message"}"#).unwrap();
        assert_eq!(rejection.into_message().as_deref(), Some("only message"));
    }
}
