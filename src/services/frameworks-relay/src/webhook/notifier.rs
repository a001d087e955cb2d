//! # Chat Notifier
//!
//! Renders an [`OutcomeReport`] as a markdown message and posts it to a
//! Discord incoming webhook. Rendering is a pure function so the exact text
//! can be tested without a server.

use crate::config::DiscordConfig;
use crate::error::{RelayError, RelayResult};
use crate::models::{FailureReport, OutcomeReport, SuccessReport};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, warn};

const SERVICE: &str = "discord";

/// Discord rejects message content longer than this many characters
pub const MAX_CONTENT_CHARS: usize = 2000;

const UNKNOWN: &str = "Unknown";
const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Posts pipeline outcomes to a chat channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &OutcomeReport) -> RelayResult<()>;
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
    username: &'a str,
}

/// Discord incoming-webhook notifier
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    http_client: Client,
    webhook_url: Option<String>,
    username: String,
    title: String,
    timeout_secs: u64,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig) -> RelayResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("frameworks-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            webhook_url: config.webhook_url.clone().filter(|url| !url.trim().is_empty()),
            username: config.username.clone(),
            title: config.title.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, report: &OutcomeReport) -> RelayResult<()> {
        let Some(url) = self.webhook_url.as_deref() else {
            debug!(trigger = %report.trigger(), "Chat webhook not configured, skipping notification");
            return Ok(());
        };

        let content = render_message(&self.title, report);
        let response = self
            .http_client
            .post(url)
            .json(&WebhookMessage {
                content: &content,
                username: &self.username,
            })
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(SERVICE, self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Chat webhook rejected message");
            return Err(RelayError::external_api(SERVICE, status.as_u16(), body));
        }

        debug!(status = status.as_u16(), "Notification sent");
        Ok(())
    }
}

/// Render the markdown message for `report`, at most [`MAX_CONTENT_CHARS`] long
pub fn render_message(title: &str, report: &OutcomeReport) -> String {
    let mut head = format!("# **{}**\n\n", title);
    let data = match report {
        OutcomeReport::Success(success) => {
            write_success_lines(&mut head, success);
            serde_json::to_value(&success.event_summary).unwrap_or(Value::Null)
        }
        OutcomeReport::Failure(failure) => {
            write_failure_lines(&mut head, failure);
            failure.original_payload.clone()
        }
    };

    head.push_str("\n📄 **Request Data**:\n```json\n");
    let tail = "\n```";
    let json = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());

    let fixed = head.chars().count() + tail.chars().count();
    if fixed >= MAX_CONTENT_CHARS {
        return truncate_chars(&head, MAX_CONTENT_CHARS);
    }

    let available = MAX_CONTENT_CHARS - fixed;
    let body = if json.chars().count() <= available {
        json
    } else {
        let keep = available.saturating_sub(TRUNCATION_MARKER.chars().count());
        let mut cut = truncate_chars(&json, keep);
        cut.push_str(TRUNCATION_MARKER);
        cut
    };

    format!("{}{}{}", head, body, tail)
}

fn write_success_lines(out: &mut String, report: &SuccessReport) {
    let summary = &report.event_summary;
    let _ = writeln!(out, "⏰ **Trigger**: {}", report.trigger);
    let _ = writeln!(out, "✅ **Success**: {}", report.message);
    let _ = writeln!(out, "👤 **Profile ID**: {}", report.profile_id);
    let _ = writeln!(out, "📋 **Event Type**: {}", summary.event_type);
    let _ = writeln!(
        out,
        "🏢 **Customer**: {}",
        summary.customer_code.as_deref().unwrap_or(UNKNOWN)
    );
}

fn write_failure_lines(out: &mut String, report: &FailureReport) {
    let payload = &report.original_payload;
    let event_type = payload
        .get("event_type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN);
    let customer = payload
        .get("data")
        .and_then(|data| data.get("customer_code"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN);
    let trigger = if report.trigger.is_empty() {
        UNKNOWN
    } else {
        report.trigger.as_str()
    };

    let _ = writeln!(out, "❌ **Error**: {}", report.error);
    if let Some(details) = &report.details {
        let _ = writeln!(out, "📝 **Details**: {}", details);
    }
    let _ = writeln!(out, "⏰ **Trigger**: {}", trigger);
    let _ = writeln!(out, "📋 **Event Type**: {}", event_type);
    let _ = writeln!(out, "🏢 **Customer**: {}", customer);
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventSummary;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TITLE: &str = "Frameworks to Klaviyo";

    fn success_report() -> OutcomeReport {
        OutcomeReport::success(
            "Webhook processed",
            "p1",
            EventSummary {
                event_type: "order_invoiced".into(),
                customer_code: Some("C1".into()),
                customer_email: None,
                timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
                processed: true,
            },
            "invoices",
        )
    }

    fn discord_config(url: Option<String>) -> DiscordConfig {
        DiscordConfig {
            webhook_url: url,
            ..DiscordConfig::default()
        }
    }

    #[test]
    fn test_render_success() {
        let message = render_message(TITLE, &success_report());
        assert!(message.starts_with("# **Frameworks to Klaviyo**\n\n"));
        assert!(message.contains("⏰ **Trigger**: invoices\n"));
        assert!(message.contains("✅ **Success**: Webhook processed\n"));
        assert!(message.contains("👤 **Profile ID**: p1\n"));
        assert!(message.contains("📋 **Event Type**: order_invoiced\n"));
        assert!(message.contains("🏢 **Customer**: C1\n"));
        assert!(message.contains("```json\n{"));
        assert!(message.contains("\"eventType\": \"order_invoiced\""));
        assert!(message.ends_with("\n```"));
    }

    #[test]
    fn test_render_failure_with_placeholders() {
        let report = OutcomeReport::failure(
            "Missing event_type or data",
            None,
            json!({"unexpected": true}),
            "orders",
        );
        let message = render_message(TITLE, &report);
        assert!(message.contains("❌ **Error**: Missing event_type or data\n"));
        assert!(!message.contains("**Details**"));
        assert!(message.contains("⏰ **Trigger**: orders\n"));
        assert!(message.contains("📋 **Event Type**: Unknown\n"));
        assert!(message.contains("🏢 **Customer**: Unknown\n"));
        assert!(message.contains("\"unexpected\": true"));
    }

    #[test]
    fn test_render_failure_with_details() {
        let report = OutcomeReport::failure(
            "Webhook processing failed",
            Some("External API error for klaviyo: 503 - unavailable".into()),
            json!({"event_type": "quote_created", "data": {"customer_code": "C7"}}),
            "quotes",
        );
        let message = render_message(TITLE, &report);
        assert!(message.contains("📝 **Details**: External API error for klaviyo: 503 - unavailable\n"));
        assert!(message.contains("📋 **Event Type**: quote_created\n"));
        assert!(message.contains("🏢 **Customer**: C7\n"));
    }

    #[test]
    fn test_render_truncates_large_payloads() {
        let big: Vec<String> = (0..500).map(|i| format!("line item ü {}", i)).collect();
        let report = OutcomeReport::failure(
            "Validation failed",
            Some("Customer code is required".into()),
            json!({"event_type": "order_invoiced", "data": {"items": big}}),
            "invoices",
        );
        let message = render_message(TITLE, &report);
        assert!(message.chars().count() <= MAX_CONTENT_CHARS);
        assert!(message.contains("(truncated)"));
        assert!(message.ends_with("\n```"));
    }

    #[test]
    fn test_render_truncates_huge_details() {
        let report = OutcomeReport::failure(
            "Webhook processing failed",
            Some("x".repeat(5000)),
            json!({}),
            "invoices",
        );
        let message = render_message(TITLE, &report);
        assert_eq!(message.chars().count(), MAX_CONTENT_CHARS);
    }

    #[tokio::test]
    async fn test_notify_posts_content_and_username() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/token"))
            .and(body_partial_json(json!({"username": "Integration Bot"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::new(&discord_config(Some(format!(
            "{}/api/webhooks/1/token",
            server.uri()
        ))))
        .unwrap();
        assert!(notifier.is_enabled());
        notifier.notify(&success_report()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["content"].as_str().unwrap(),
            render_message(TITLE, &success_report())
        );
    }

    #[tokio::test]
    async fn test_notify_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("content too long"))
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::new(&discord_config(Some(server.uri()))).unwrap();
        let err = notifier.notify(&success_report()).await.unwrap_err();
        assert!(matches!(err, RelayError::ExternalApi { status_code: 400, .. }));
    }

    #[tokio::test]
    async fn test_notify_without_url_is_noop() {
        let notifier = DiscordNotifier::new(&discord_config(None)).unwrap();
        assert!(!notifier.is_enabled());
        notifier.notify(&success_report()).await.unwrap();

        let notifier = DiscordNotifier::new(&discord_config(Some("  ".into()))).unwrap();
        assert!(!notifier.is_enabled());
    }
}
