//! # Webhook Event Pipeline
//!
//! Everything between an authenticated `POST /webhook/:trigger` body and the
//! decided response:
//! - raw audit copy of every inbound body ([`audit`])
//! - shape validation ([`validator`]) and event-type tables ([`event_type`])
//! - pure transformation into a canonical event ([`transformer`])
//! - delivery and profile resolution against Klaviyo ([`klaviyo`]), with
//!   bounded retries ([`retry`])
//! - chat notification of the outcome ([`notifier`])
//! - the per-request state machine tying them together ([`pipeline`])

pub mod audit;
pub mod event_type;
pub mod klaviyo;
pub mod notifier;
pub mod pipeline;
pub mod retry;
pub mod transformer;
pub mod validator;

pub use audit::{AuditRecorder, FileAuditStore};
pub use event_type::EventType;
pub use klaviyo::{DeliveryDispatcher, KlaviyoClient, ProfileResolver};
pub use notifier::{render_message, DiscordNotifier, Notifier};
pub use pipeline::{PipelineOrchestrator, PipelineOutcome};
pub use retry::RetryPolicy;
pub use validator::{EventValidator, ValidationReport};
