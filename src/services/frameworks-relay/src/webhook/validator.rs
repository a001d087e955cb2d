//! # Event Validator
//!
//! Checks that an inbound event has the minimum shape needed before it is
//! transformed. Every rule is evaluated independently so the caller receives
//! the complete list of violations, in rule order.

use crate::models::InboundEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Verdict of [`EventValidator::validate`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// All errors joined for a single-line detail message
    pub fn summary(&self) -> String {
        self.errors.join("; ")
    }
}

/// Stateless validator for inbound events
#[derive(Debug, Clone, Copy, Default)]
pub struct EventValidator;

impl EventValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate an inbound event. Never fails; problems are reported in the result.
    pub fn validate(&self, event: &InboundEvent) -> ValidationReport {
        let mut errors = Vec::new();

        if event
            .event_type
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
        {
            errors.push("Event type is required".to_string());
        }

        match event.payload {
            None => errors.push("Event data is required".to_string()),
            Some(Value::Object(_)) => {}
            Some(_) => errors.push("Event data must be an object".to_string()),
        }

        if event.customer_code().map_or(true, |c| c.trim().is_empty()) {
            errors.push("Customer code is required".to_string());
        }

        ValidationReport::from_errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(body: Value) -> InboundEvent {
        InboundEvent::from_body("test", body)
    }

    #[test]
    fn test_valid_event() {
        let report = EventValidator::new().validate(&event(json!({
            "event_type": "welcome_flow",
            "data": {"customer_code": "C1"}
        })));
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_accumulates_every_violation() {
        let report = EventValidator::new().validate(&event(json!({})));
        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec![
                "Event type is required",
                "Event data is required",
                "Customer code is required",
            ]
        );
    }

    #[test]
    fn test_empty_customer_code() {
        let report = EventValidator::new().validate(&event(json!({
            "event_type": "quote_created",
            "data": {"customer_code": "  "}
        })));
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Customer code is required"]);
        assert_eq!(report.summary(), "Customer code is required");
    }

    #[test]
    fn test_non_object_data() {
        let report = EventValidator::new().validate(&event(json!({
            "event_type": "quote_created",
            "data": [1, 2, 3]
        })));
        assert_eq!(
            report.errors,
            vec!["Event data must be an object", "Customer code is required"]
        );
    }

    #[test]
    fn test_empty_event_type() {
        let report = EventValidator::new().validate(&event(json!({
            "event_type": "",
            "data": {"customer_code": "C1"}
        })));
        assert_eq!(report.errors, vec!["Event type is required"]);
    }
}
