//! Error handling module for the Frameworks relay
//!
//! Two layers of errors live here. [`TransformError`] is produced by the pure
//! event transformation and never touches I/O. [`RelayError`] covers everything
//! the service can run into once a request is authenticated: downstream calls to
//! the marketing API and chat webhook, local audit persistence and startup
//! configuration.

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Failures of the pure event transformation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid created_at timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Error taxonomy for the relay service
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Transformation of an inbound event failed
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// HTTP client errors
    #[error("HTTP client error: {source}")]
    HttpClient {
        #[from]
        source: reqwest::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Non-success response from an external API
    #[error("External API error for {service}: {status_code} - {message}")]
    ExternalApi {
        service: String,
        status_code: u16,
        message: String,
    },

    /// Downstream call exceeded its deadline
    #[error("{service} request timed out after {seconds} seconds")]
    Timeout { service: String, seconds: u64 },

    /// Audit store read/write/delete failures
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl RelayError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new external API error
    pub fn external_api<S1: Into<String>, S2: Into<String>>(
        service: S1,
        status_code: u16,
        message: S2,
    ) -> Self {
        Self::ExternalApi {
            service: service.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(service: S, seconds: u64) -> Self {
        Self::Timeout {
            service: service.into(),
            seconds,
        }
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Map a reqwest failure for `service`, keeping timeouts distinguishable
    pub fn from_reqwest(service: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(service, timeout_secs)
        } else {
            Self::HttpClient { source: err }
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Transform(_) => StatusCode::BAD_REQUEST,
            RelayError::Configuration { .. }
            | RelayError::HttpClient { .. }
            | RelayError::Serialization { .. }
            | RelayError::ExternalApi { .. }
            | RelayError::Timeout { .. }
            | RelayError::Persistence { .. }
            | RelayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error (for API responses and logs)
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::Configuration { .. } => "CONFIGURATION_ERROR",
            RelayError::Transform(TransformError::UnsupportedEventType(_)) => {
                "UNSUPPORTED_EVENT_TYPE"
            }
            RelayError::Transform(_) => "TRANSFORM_ERROR",
            RelayError::HttpClient { .. } => "HTTP_CLIENT_ERROR",
            RelayError::Serialization { .. } => "SERIALIZATION_ERROR",
            RelayError::ExternalApi { .. } => "EXTERNAL_API_ERROR",
            RelayError::Timeout { .. } => "TIMEOUT",
            RelayError::Persistence { .. } => "PERSISTENCE_ERROR",
            RelayError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Check if this error is worth another delivery attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::HttpClient { .. } | RelayError::Timeout { .. } => true,
            RelayError::ExternalApi { status_code, .. } => {
                *status_code == 429 || *status_code >= 500 || *status_code == 0
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error() {
        let error = RelayError::configuration("missing KLAVIYO_API_KEY");
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.error_code(), "CONFIGURATION_ERROR");
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_transform_error_is_bad_request() {
        let error: RelayError = TransformError::MissingField("created_at".into()).into();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.error_code(), "TRANSFORM_ERROR");
        assert_eq!(error.to_string(), "Missing required field: created_at");

        let error: RelayError = TransformError::UnsupportedEventType("refund".into()).into();
        assert_eq!(error.error_code(), "UNSUPPORTED_EVENT_TYPE");
    }

    #[test]
    fn test_external_api_retryability() {
        assert!(RelayError::external_api("klaviyo", 503, "unavailable").is_retryable());
        assert!(RelayError::external_api("klaviyo", 429, "throttled").is_retryable());
        assert!(!RelayError::external_api("klaviyo", 400, "bad request").is_retryable());
        assert!(!RelayError::external_api("klaviyo", 401, "unauthorized").is_retryable());
    }

    #[test]
    fn test_timeout_error() {
        let error = RelayError::timeout("klaviyo", 10);
        assert!(error.is_retryable());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.to_string().contains("timed out after 10 seconds"));
    }

    #[test]
    fn test_io_error_becomes_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: RelayError = io.into();
        assert_eq!(error.error_code(), "PERSISTENCE_ERROR");
        assert!(!error.is_retryable());
    }
}
