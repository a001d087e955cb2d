//! Enumerated inbound event kinds and their projection tables

use crate::error::TransformError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inbound event kinds accepted from Frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OrderInvoiced,
    QuoteCreated,
    WelcomeFlow,
    EmailChanged,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::OrderInvoiced,
        EventType::QuoteCreated,
        EventType::WelcomeFlow,
        EventType::EmailChanged,
    ];

    /// Wire name as sent in `event_type`
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderInvoiced => "order_invoiced",
            EventType::QuoteCreated => "quote_created",
            EventType::WelcomeFlow => "welcome_flow",
            EventType::EmailChanged => "email_changed",
        }
    }

    /// Metric name reported to the marketing API
    pub fn metric_name(&self) -> &'static str {
        match self {
            EventType::OrderInvoiced => "Frameworks Invoice Created",
            EventType::QuoteCreated => "Quote Created",
            EventType::WelcomeFlow => "Welcome Flow Started",
            EventType::EmailChanged => "Email Changed",
        }
    }

    /// Payload fields copied verbatim into the property bag, besides the
    /// customer code which is always copied as `frameworks_customer_code`
    pub fn projected_fields(&self) -> &'static [&'static str] {
        match self {
            EventType::OrderInvoiced => &[
                "invoice_number",
                "order_value_inc_gst",
                "branch",
                "order_type",
            ],
            EventType::QuoteCreated => &[
                "quote_number",
                "quote_value_inc_gst",
                "branch",
                "quote_type",
            ],
            EventType::WelcomeFlow => &["customer_name", "branch"],
            EventType::EmailChanged => &["previous_email", "new_email"],
        }
    }

    /// Payload field holding the email used for profile lookup
    pub fn email_field(&self) -> &'static str {
        match self {
            EventType::EmailChanged => "new_email",
            _ => "customer_email",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| TransformError::UnsupportedEventType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_wire_names() {
        for event_type in EventType::ALL {
            assert_eq!(event_type.as_str().parse::<EventType>(), Ok(event_type));
        }
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        for name in ["", "ORDER_INVOICED", "order-invoiced", "payment_received", " quote_created"] {
            assert_eq!(
                name.parse::<EventType>(),
                Err(TransformError::UnsupportedEventType(name.to_string()))
            );
        }
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(EventType::OrderInvoiced.metric_name(), "Frameworks Invoice Created");
        assert_eq!(EventType::QuoteCreated.metric_name(), "Quote Created");
        assert_eq!(EventType::WelcomeFlow.metric_name(), "Welcome Flow Started");
        assert_eq!(EventType::EmailChanged.metric_name(), "Email Changed");
    }
}
