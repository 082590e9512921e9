use serde_json::{Map, Value, json};
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Marker substituted for sensitive values in redacted exports
pub const REDACTED: &str = "[REDACTED]";

/// S3 rejects single-PUT payloads above 5 GiB
const PLATFORM_PAYLOAD_CEILING: u64 = 5 * 1024 * 1024 * 1024;

/// Settings paths that must be present and non-empty before any upload
const REQUIRED_PATHS: [&str; 2] = ["lambda.functionUrl", "aws.region"];

/// Errors raised by configuration validation and persistence
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more required settings are absent or empty
    #[error("Missing required configuration: {}", missing.join(", "))]
    Invalid { missing: Vec<String> },

    /// The grant endpoint URL does not use HTTPS
    #[error("Lambda function URL must use HTTPS (got '{url}')")]
    InsecureEndpoint { url: String },

    /// Serializing the settings tree failed
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Writing the settings file failed
    #[error("Failed to save config to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Layered configuration for the chat-log uploader.
///
/// Built by deep-merging a base defaults tree (seeded from environment
/// variables) with an environment-specific override block, optionally
/// followed by a file-supplied layer. Merge rule: objects merge
/// recursively, arrays and scalars replace wholesale, later layers win
/// per key. Treat the tree as read-only after [`load`](Settings::load);
/// [`set`](Settings::set) exists for testing and debugging.
#[derive(Debug, Clone)]
pub struct Settings {
    environment: String,
    tree: Value,
}

impl Settings {
    /// Build the merged settings tree for the given environment label.
    ///
    /// Unknown labels get no override block and resolve to the base
    /// defaults unchanged.
    pub fn load(environment: &str) -> Self {
        let mut tree = default_tree();
        deep_merge(&mut tree, &environment_overrides(environment));

        Self {
            environment: environment.to_string(),
            tree,
        }
    }

    /// Environment label this settings tree was built for
    #[allow(dead_code)] // used by the chatlog-config binary
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Look up a value by dotted path (e.g. `lambda.functionUrl`).
    ///
    /// Returns `None` as soon as a segment is absent or the current
    /// node is not an object; never errors.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.tree;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Like [`get`](Self::get), but clones the value and falls back to
    /// `default` when the path does not resolve.
    #[allow(dead_code)] // part of the public surface, exercised by tests
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    /// String convenience accessor
    pub fn get_str(&self, path: &str) -> Option<String> {
        self.get(path).and_then(Value::as_str).map(str::to_string)
    }

    /// Unsigned integer convenience accessor
    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    /// Overwrite the value at a dotted path, creating intermediate
    /// object nodes as needed. Non-object intermediates are replaced.
    #[allow(dead_code)] // mutation is a testing/debugging affordance
    pub fn set(&mut self, path: &str, value: Value) {
        let mut current = &mut self.tree;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let Value::Object(map) = current else { return };

            if segments.peek().is_some() {
                current = map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            } else {
                map.insert(segment.to_string(), value);
                return;
            }
        }
    }

    /// Check that every required setting is present and that the grant
    /// endpoint uses HTTPS.
    ///
    /// An oversized `upload.maxFileSize` only logs a warning since the
    /// platform ceiling is enforced remotely anyway.
    #[allow(dead_code)] // used by the chatlog-config binary
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<String> = REQUIRED_PATHS
            .iter()
            .filter(|path| self.get(path).is_none_or(value_is_blank))
            .map(|path| path.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::Invalid { missing });
        }

        let url = self.get_str("lambda.functionUrl").unwrap_or_default();
        if !url.starts_with("https://") {
            return Err(ConfigError::InsecureEndpoint { url });
        }

        if let Some(max) = self.get_u64("upload.maxFileSize") {
            if max > PLATFORM_PAYLOAD_CEILING {
                warn!(
                    "max file size {} bytes exceeds the 5 GiB platform payload ceiling",
                    max
                );
            }
        }

        Ok(())
    }

    /// Serialize the full tree as pretty JSON.
    ///
    /// With `include_secrets` unset, the grant endpoint URL is replaced
    /// by [`REDACTED`] before encoding.
    #[allow(dead_code)] // used by the chatlog-config binary
    pub fn export_json(&self, include_secrets: bool) -> Result<String, ConfigError> {
        let tree = if include_secrets {
            self.tree.clone()
        } else {
            self.redacted_tree()
        };
        Ok(serde_json::to_string_pretty(&tree)?)
    }

    /// Merge a JSON file over the current tree, best-effort.
    ///
    /// A missing file or a parse failure logs a warning and leaves the
    /// settings untouched.
    #[allow(dead_code)] // optional file layer, not wired into the CLIs
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let layer = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|data| serde_json::from_str::<Value>(&data).map_err(|e| e.to_string()));

        match layer {
            Ok(layer) => deep_merge(&mut self.tree, &layer),
            Err(e) => warn!("could not load config file {}: {}", path.display(), e),
        }
    }

    /// Write the exported JSON to a file.
    #[allow(dead_code)] // optional file layer, not wired into the CLIs
    pub fn save_to_file(
        &self,
        path: impl AsRef<Path>,
        include_secrets: bool,
    ) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let data = self.export_json(include_secrets)?;
        std::fs::write(path, data).map_err(|source| ConfigError::Persist {
            path: path.display().to_string(),
            source,
        })
    }

    fn redacted_tree(&self) -> Value {
        let mut tree = self.tree.clone();
        if let Some(url) = tree.pointer_mut("/lambda/functionUrl") {
            if url.as_str().is_some_and(|s| !s.is_empty()) {
                *url = Value::String(REDACTED.to_string());
            }
        }
        tree
    }
}

/// Deep-merge `source` into `target`: objects merge recursively, arrays
/// and scalars replace wholesale.
pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(key) {
                    Some(target_value) if target_value.is_object() && source_value.is_object() => {
                        deep_merge(target_value, source_value);
                    }
                    _ => {
                        target_map.insert(key.clone(), source_value.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// Detect the environment label from the process environment.
///
/// Order: `NODE_ENV`, then `ENVIRONMENT`, then a `HOSTNAME` substring
/// heuristic, defaulting to `dev`. Kept at the process boundary so that
/// [`Settings::load`] itself stays a pure function of its label.
pub fn detect_environment() -> String {
    for key in ["NODE_ENV", "ENVIRONMENT"] {
        if let Ok(value) = env::var(key) {
            if !value.is_empty() {
                return value;
            }
        }
    }

    let hostname = env::var("HOSTNAME").unwrap_or_default();
    if hostname.contains("prod") {
        "prod".to_string()
    } else if hostname.contains("staging") {
        "staging".to_string()
    } else {
        "dev".to_string()
    }
}

/// Base defaults, each leaf seeded from its environment variable
fn default_tree() -> Value {
    json!({
        "aws": {
            "region": env_or("AWS_REGION", "ap-northeast-1"),
            "s3": {
                "bucketNamePrefix": "media-viewer-v209-chat-logs",
                "keyPrefix": "chat-logs/",
                "serverSideEncryption": "aws:kms",
            },
        },
        "lambda": {
            "functionUrl": env_or("LAMBDA_FUNCTION_URL", ""),
            "timeout": env_u64("LAMBDA_TIMEOUT", 30_000),
            "retryAttempts": env_u64("LAMBDA_RETRY_ATTEMPTS", 3),
            "retryDelay": env_u64("LAMBDA_RETRY_DELAY", 1_000),
        },
        "upload": {
            "maxFileSize": env_u64("MAX_FILE_SIZE", 100 * 1024 * 1024),
            "allowedContentTypes": ["application/json", "text/plain"],
            "presignedUrlExpiry": env_u64("PRESIGNED_URL_EXPIRY", 3_600),
            "compressionEnabled": env_is_true("COMPRESSION_ENABLED"),
            "encryptionRequired": !env_is_false("ENCRYPTION_REQUIRED"),
        },
        "client": {
            "userAgent": "MediaViewer-v209-ChatLogUploader/1.0",
            "connectTimeout": env_u64("CONNECT_TIMEOUT", 30_000),
            "readTimeout": env_u64("READ_TIMEOUT", 60_000),
            "maxConcurrentUploads": env_u64("MAX_CONCURRENT_UPLOADS", 3),
        },
        "logging": {
            "level": env_or("LOG_LEVEL", "info"),
            "enableConsole": !env_is_false("LOG_CONSOLE"),
            "enableFile": env_is_true("LOG_FILE"),
            "logDirectory": env_or("LOG_DIRECTORY", "./logs"),
        },
        "development": {
            "skipSSLVerification": env_is_true("SKIP_SSL_VERIFICATION"),
            "enableDebugMode": env_is_true("DEBUG_MODE"),
            "mockAWSServices": env_is_true("MOCK_AWS"),
        },
    })
}

/// Override block for a known environment label; unknown labels get none
fn environment_overrides(environment: &str) -> Value {
    match environment {
        "dev" => json!({
            "logging": {
                "level": "debug",
                "enableConsole": true,
            },
            "development": {
                "enableDebugMode": true,
            },
        }),
        "staging" => json!({
            "aws": {
                "region": "ap-northeast-1",
            },
            "logging": {
                "level": "info",
                "enableFile": true,
            },
        }),
        "prod" => json!({
            "aws": {
                "region": "ap-northeast-1",
            },
            "logging": {
                "level": "warn",
                "enableFile": true,
                "enableConsole": false,
            },
            "development": {
                "skipSSLVerification": false,
                "enableDebugMode": false,
                "mockAWSServices": false,
            },
        }),
        _ => json!({}),
    }
}

fn value_is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_is_true(key: &str) -> bool {
    env::var(key).is_ok_and(|v| v == "true")
}

fn env_is_false(key: &str) -> bool {
    env::var(key).is_ok_and(|v| v == "false")
}
