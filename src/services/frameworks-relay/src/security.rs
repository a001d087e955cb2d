//! Security module for the Frameworks relay
//!
//! Shared-secret verification for inbound webhooks and redaction helpers used
//! before anything sensitive reaches the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

const REDACTED: &str = "[REDACTED]";

/// Why an inbound request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyRejection {
    Missing,
    Invalid,
}

impl ApiKeyRejection {
    pub fn error(&self) -> &'static str {
        match self {
            ApiKeyRejection::Missing => "Missing API key",
            ApiKeyRejection::Invalid => "Invalid API key",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ApiKeyRejection::Missing => "X-API-Key header is required",
            ApiKeyRejection::Invalid => "The provided API key is incorrect",
        }
    }
}

impl IntoResponse for ApiKeyRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": self.error(),
                "message": self.message(),
            })),
        )
            .into_response()
    }
}

/// Security utilities for webhook verification
pub struct SecurityUtils;

impl SecurityUtils {
    /// Check a provided API key against the configured secret in constant time
    pub fn verify_api_key(provided: Option<&str>, expected: &str) -> Result<(), ApiKeyRejection> {
        let provided = match provided.map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => return Err(ApiKeyRejection::Missing),
        };

        if expected.is_empty() || !Self::constant_time_eq(provided, expected) {
            warn!(provided = %Self::redact_key(provided), "Invalid API key provided");
            return Err(ApiKeyRejection::Invalid);
        }

        Ok(())
    }

    /// Constant-time string comparison
    pub fn constant_time_eq(a: &str, b: &str) -> bool {
        a.as_bytes().ct_eq(b.as_bytes()).into()
    }

    /// Loggable form of a secret: the first four characters, then a mask
    pub fn redact_key(key: &str) -> String {
        let prefix: String = key.chars().take(4).collect();
        if key.chars().count() <= 4 {
            "****".to_string()
        } else {
            format!("{}****", prefix)
        }
    }

    /// Copy of a payload with credential-looking fields masked
    pub fn sanitize_for_logging(payload: &Value) -> Value {
        match payload {
            Value::Object(obj) => {
                let mut sanitized = Map::new();
                for (key, value) in obj {
                    let key_lower = key.to_lowercase();
                    if key_lower.contains("token")
                        || key_lower.contains("secret")
                        || key_lower.contains("password")
                        || key_lower.contains("api_key")
                        || key_lower.contains("auth")
                    {
                        sanitized.insert(key.clone(), Value::String(REDACTED.to_string()));
                    } else {
                        sanitized.insert(key.clone(), Self::sanitize_for_logging(value));
                    }
                }
                Value::Object(sanitized)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(Self::sanitize_for_logging).collect()),
            _ => payload.clone(),
        }
    }
}
