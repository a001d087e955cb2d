//! # Pipeline Orchestrator
//!
//! Sequences one inbound webhook call through audit, validation,
//! transformation, delivery and notification, and decides the HTTP status.
//!
//! ```text
//! RECEIVED -> AUDITED -> VALIDATED -> TRANSFORMED -> DISPATCHED      -> NOTIFIED -> RESPONDED
//!                 \            \             \    \-> DISPATCH_FAILED -/
//!                  \------------\-------------\-> REJECTED ----------/
//! ```
//!
//! The audit write happens before anything is known about the request and
//! never fails it. The notification is spawned after the outcome is decided
//! and never changes it. Both the response body and the notification are
//! built from the same [`OutcomeReport`].
//!
//! Profile resolution and delivery share one deadline. It must be shorter
//! than the HTTP request timeout so an exhausted delivery still produces a
//! `DISPATCH_FAILED` report instead of a dropped request.

use super::audit::AuditRecorder;
use super::event_type::EventType;
use super::klaviyo::{DeliveryDispatcher, ProfileResolver};
use super::notifier::Notifier;
use super::transformer;
use super::validator::EventValidator;
use crate::config::ProfileStrategy;
use crate::error::{RelayError, RelayResult};
use crate::models::{CanonicalEvent, EventSummary, InboundEvent, OutcomeReport};
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub const MISSING_FIELDS: &str = "Missing event_type or data";
pub const UNKNOWN_EVENT_TYPE: &str = "Unknown event type";
pub const VALIDATION_FAILED: &str = "Validation failed";
pub const TRANSFORM_FAILED: &str = "Invalid event data";
pub const PROCESSING_FAILED: &str = "Webhook processing failed";
pub const PROCESSED: &str = "Webhook processed";

const DEFAULT_DELIVERY_DEADLINE: Duration = Duration::from_secs(20);

/// Decided result of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub status: StatusCode,
    pub report: OutcomeReport,
}

impl PipelineOutcome {
    fn rejected(status: StatusCode, report: OutcomeReport) -> Self {
        Self { status, report }
    }
}

/// Per-request pipeline over injected collaborators
#[derive(Clone)]
pub struct PipelineOrchestrator {
    audit: Arc<dyn AuditRecorder>,
    validator: EventValidator,
    resolver: Arc<dyn ProfileResolver>,
    dispatcher: Arc<dyn DeliveryDispatcher>,
    notifier: Arc<dyn Notifier>,
    profile_strategy: ProfileStrategy,
    delivery_deadline: Duration,
}

impl PipelineOrchestrator {
    pub fn new(
        audit: Arc<dyn AuditRecorder>,
        resolver: Arc<dyn ProfileResolver>,
        dispatcher: Arc<dyn DeliveryDispatcher>,
        notifier: Arc<dyn Notifier>,
        profile_strategy: ProfileStrategy,
    ) -> Self {
        Self {
            audit,
            validator: EventValidator::new(),
            resolver,
            dispatcher,
            notifier,
            profile_strategy,
            delivery_deadline: DEFAULT_DELIVERY_DEADLINE,
        }
    }

    /// Bound resolution plus delivery, retries included
    pub fn with_delivery_deadline(mut self, deadline: Duration) -> Self {
        self.delivery_deadline = deadline;
        self
    }

    /// Run the pipeline and fire the notification in the background
    pub async fn handle(&self, trigger: &str, raw: Value) -> PipelineOutcome {
        let outcome = self.process(trigger, raw).await;

        let notifier = Arc::clone(&self.notifier);
        let report = outcome.report.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&report).await {
                warn!(trigger = %report.trigger(), error = %e, "Failed to send notification");
            }
        });

        outcome
    }

    /// Run every step up to the decided outcome, without notifying
    #[instrument(skip_all, fields(trigger = %trigger))]
    pub async fn process(&self, trigger: &str, raw: Value) -> PipelineOutcome {
        if let Err(e) = self.audit.persist(&raw).await {
            error!(error = %e, "Failed to store audit copy");
        }

        let event = InboundEvent::from_body(trigger, raw);

        let event_type_name = match event.event_type.as_deref() {
            Some(name) if !name.is_empty() && event.payload.is_some() => name.to_string(),
            _ => {
                warn!("Rejected webhook without event_type or data");
                return self.reject(StatusCode::BAD_REQUEST, MISSING_FIELDS, None, event);
            }
        };

        let event_type: EventType = match event_type_name.parse() {
            Ok(event_type) => event_type,
            Err(e) => {
                let err = RelayError::from(e);
                warn!(event_type = %event_type_name, error_code = err.error_code(), "Rejected unknown event type");
                let details = err.to_string();
                return self.reject(
                    StatusCode::BAD_REQUEST,
                    UNKNOWN_EVENT_TYPE,
                    Some(details),
                    event,
                );
            }
        };

        let report = self.validator.validate(&event);
        if !report.valid {
            warn!(event_type = %event_type, errors = ?report.errors, "Rejected invalid webhook");
            return self.reject(
                StatusCode::BAD_REQUEST,
                VALIDATION_FAILED,
                Some(report.summary()),
                event,
            );
        }

        let empty = Map::new();
        let payload = event.payload_object().unwrap_or(&empty);
        let customer_code = event.customer_code().unwrap_or_default();

        info!(
            event_type = %event_type,
            customer_code = %customer_code,
            "Processing webhook"
        );

        // Under lookup the profile id is filled in after resolution, so an
        // invalid payload never reaches the marketing API.
        let payload_profile = match self.profile_strategy {
            ProfileStrategy::PayloadId => None,
            ProfileStrategy::Lookup => Some(""),
        };

        let canonical: CanonicalEvent = match transformer::transform_with_profile(
            event_type.as_str(),
            payload,
            payload_profile,
        ) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(event_type = %event_type, error = %e, "Transformation failed");
                let status = RelayError::from(e.clone()).status_code();
                return self.reject(status, TRANSFORM_FAILED, Some(e.to_string()), event);
            }
        };

        let delivery = tokio::time::timeout(
            self.delivery_deadline,
            self.deliver(event_type, &event, canonical),
        )
        .await
        .unwrap_or_else(|_| Err(RelayError::timeout("klaviyo", self.delivery_deadline.as_secs())));

        let canonical = match delivery {
            Ok(canonical) => canonical,
            Err(e) => {
                error!(error = %e, error_code = e.error_code(), "Delivery to marketing API failed");
                return self.reject(
                    e.status_code(),
                    PROCESSING_FAILED,
                    Some(e.to_string()),
                    event,
                );
            }
        };

        let summary = EventSummary {
            event_type: event_type.as_str().to_string(),
            customer_code: event.customer_code().map(str::to_string),
            customer_email: event.customer_email().map(str::to_string),
            timestamp: Utc::now(),
            processed: true,
        };

        info!(profile_id = %canonical.profile_id(), "Webhook processed");
        PipelineOutcome {
            status: StatusCode::OK,
            report: OutcomeReport::success(PROCESSED, canonical.profile_id(), summary, trigger),
        }
    }

    /// Resolve the profile when configured, then send the event
    async fn deliver(
        &self,
        event_type: EventType,
        event: &InboundEvent,
        mut canonical: CanonicalEvent,
    ) -> RelayResult<CanonicalEvent> {
        if self.profile_strategy == ProfileStrategy::Lookup {
            let email = event
                .payload_object()
                .and_then(|data| data.get(event_type.email_field()))
                .and_then(Value::as_str)
                .or_else(|| event.customer_email());
            let customer_code = event.customer_code().unwrap_or_default();
            canonical.profile_ref.id = self.resolver.resolve(email, customer_code).await?;
        }

        debug!(metric = %canonical.metric_name(), profile_id = %canonical.profile_id(), "Transformed event");

        self.dispatcher.send(&canonical).await?;
        Ok(canonical)
    }

    fn reject(
        &self,
        status: StatusCode,
        error: &str,
        details: Option<String>,
        event: InboundEvent,
    ) -> PipelineOutcome {
        PipelineOutcome::rejected(
            status,
            OutcomeReport::failure(error, details, event.raw, event.trigger),
        )
    }
}
