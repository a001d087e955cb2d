//! # Event Transformer
//!
//! Maps an inbound `(event_type, data)` pair onto a [`CanonicalEvent`]. The
//! transformation is pure: no I/O and no clock reads, the output depends only
//! on the input.
//!
//! The envelope fields are strict. `customer_code` and a parsable RFC 3339
//! `created_at` are always required, and `id` is required unless the caller
//! supplies a resolved profile id. The type-specific property fields are
//! copied when present and left out when absent, so partial payloads reach
//! the marketing API unchanged.

use super::event_type::EventType;
use crate::error::TransformError;
use crate::models::{CanonicalEvent, Metric, ProfileRef};
use chrono::DateTime;
use serde_json::{Map, Value};
use tracing::debug;

/// Property name the customer code is copied to
pub const CUSTOMER_CODE_PROPERTY: &str = "frameworks_customer_code";

/// Transform using `payload.id` as the profile reference
pub fn transform(event_type: &str, payload: &Map<String, Value>) -> Result<CanonicalEvent, TransformError> {
    transform_with_profile(event_type, payload, None)
}

/// Transform with an optional externally resolved profile id
pub fn transform_with_profile(
    event_type: &str,
    payload: &Map<String, Value>,
    resolved_profile_id: Option<&str>,
) -> Result<CanonicalEvent, TransformError> {
    let event_type: EventType = event_type.parse()?;

    let customer_code = required_value(payload, "customer_code")?;
    let occurred_at = parse_created_at(payload)?;
    let profile_id = match resolved_profile_id {
        Some(id) => id.to_string(),
        None => scalar_to_string(required_value(payload, "id")?),
    };

    let mut properties = Map::new();
    properties.insert(CUSTOMER_CODE_PROPERTY.to_string(), customer_code.clone());
    for field in event_type.projected_fields() {
        match payload.get(*field) {
            Some(value) => {
                properties.insert((*field).to_string(), value.clone());
            }
            None => debug!(event_type = %event_type, field = *field, "Projected field absent"),
        }
    }

    Ok(CanonicalEvent {
        profile_ref: ProfileRef { id: profile_id },
        metric: Metric {
            name: event_type.metric_name().to_string(),
        },
        occurred_at,
        properties,
    })
}

fn required_value<'a>(payload: &'a Map<String, Value>, field: &str) -> Result<&'a Value, TransformError> {
    match payload.get(field) {
        None | Some(Value::Null) => Err(TransformError::MissingField(field.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(TransformError::MissingField(field.to_string()))
        }
        Some(value) => Ok(value),
    }
}

/// `created_at` as unix seconds; unparsable values are rejected rather than defaulted
fn parse_created_at(payload: &Map<String, Value>) -> Result<i64, TransformError> {
    let raw = required_value(payload, "created_at")?;
    let text = raw.as_str().ok_or_else(|| TransformError::InvalidTimestamp {
        value: raw.to_string(),
        reason: "expected an RFC 3339 string".to_string(),
    })?;

    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.timestamp())
        .map_err(|e| TransformError::InvalidTimestamp {
            value: text.to_string(),
            reason: e.to_string(),
        })
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
