//! Data models for the Frameworks relay
//!
//! This module defines the inbound event crossing the trust boundary, the
//! canonical event handed to the marketing API, and the outcome report shared
//! by the HTTP response and the chat notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound webhook call, as received on `POST /webhook/:trigger`
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Path segment identifying the integration that fired the webhook
    pub trigger: String,
    /// `event_type` from the body; `None` when absent, null, `false`, `0` or
    /// empty. Other non-string values keep their JSON rendering so they are
    /// reported as unknown types rather than missing ones.
    pub event_type: Option<String>,
    /// `data` from the body; `None` when absent or null
    pub payload: Option<Value>,
    /// The raw body exactly as received
    pub raw: Value,
}

impl InboundEvent {
    /// Split a raw request body into its event parts
    pub fn from_body(trigger: impl Into<String>, raw: Value) -> Self {
        let event_type = raw.get("event_type").and_then(event_type_name);
        let payload = raw.get("data").filter(|v| !v.is_null()).cloned();

        Self {
            trigger: trigger.into(),
            event_type,
            payload,
            raw,
        }
    }

    /// Payload as a JSON object, if it is one
    pub fn payload_object(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref().and_then(Value::as_object)
    }

    /// `payload.customer_code` as a string
    pub fn customer_code(&self) -> Option<&str> {
        self.payload_field("customer_code")
    }

    /// `payload.customer_email`, falling back to `payload.email`
    pub fn customer_email(&self) -> Option<&str> {
        self.payload_field("customer_email")
            .or_else(|| self.payload_field("email"))
    }

    fn payload_field(&self, name: &str) -> Option<&str> {
        self.payload_object()
            .and_then(|data| data.get(name))
            .and_then(Value::as_str)
    }
}

fn event_type_name(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(name) if name.is_empty() => None,
        Value::String(name) => Some(name.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// Reference to the downstream profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRef {
    #[serde(rename = "$id")]
    pub id: String,
}

/// Metric descriptor of a canonical event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
}

/// Sink-agnostic outbound event
///
/// Serializes to the attribute shape accepted by the marketing API's events
/// endpoint: `{profile: {$id}, metric: {name}, timestamp, properties}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    #[serde(rename = "profile")]
    pub profile_ref: ProfileRef,
    pub metric: Metric,
    /// Unix seconds derived from `payload.created_at`
    #[serde(rename = "timestamp")]
    pub occurred_at: i64,
    pub properties: Map<String, Value>,
}

impl CanonicalEvent {
    pub fn metric_name(&self) -> &str {
        &self.metric.name
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_ref.id
    }
}

/// Summary of a successfully relayed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub event_type: String,
    pub customer_code: Option<String>,
    pub customer_email: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
}

/// Success half of an [`OutcomeReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessReport {
    pub success: bool,
    pub message: String,
    pub profile_id: String,
    pub event_summary: EventSummary,
    pub trigger: String,
}

/// Failure half of an [`OutcomeReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub success: bool,
    /// Stable error category
    pub error: String,
    /// Human readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Inbound body exactly as received
    #[serde(rename = "data")]
    pub original_payload: Value,
    pub trigger: String,
}

/// Result of one pipeline run, consumed by both the HTTP response and the notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutcomeReport {
    Success(SuccessReport),
    Failure(FailureReport),
}

impl OutcomeReport {
    pub fn success(
        message: impl Into<String>,
        profile_id: impl Into<String>,
        event_summary: EventSummary,
        trigger: impl Into<String>,
    ) -> Self {
        Self::Success(SuccessReport {
            success: true,
            message: message.into(),
            profile_id: profile_id.into(),
            event_summary,
            trigger: trigger.into(),
        })
    }

    pub fn failure(
        error: impl Into<String>,
        details: Option<String>,
        original_payload: Value,
        trigger: impl Into<String>,
    ) -> Self {
        Self::Failure(FailureReport {
            success: false,
            error: error.into(),
            details,
            original_payload,
            trigger: trigger.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeReport::Success(_))
    }

    pub fn trigger(&self) -> &str {
        match self {
            OutcomeReport::Success(report) => &report.trigger,
            OutcomeReport::Failure(report) => &report.trigger,
        }
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
}

/// Body returned for unmatched routes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotFoundResponse {
    pub error: String,
    pub message: String,
    pub available_routes: Vec<String>,
}
