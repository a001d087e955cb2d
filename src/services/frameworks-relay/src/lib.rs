//! # Frameworks Relay
//!
//! Receives business events from the Frameworks ERP over an authenticated
//! webhook and forwards them to Klaviyo as marketing events.
//!
//! ## Features
//!
//! - **Authentication**: shared `X-API-Key` secret, compared in constant time
//! - **Audit trail**: every authenticated body is written to the audit store
//!   before anything else happens, with bounded retention
//! - **Normalization**: four supported event types are validated and mapped to
//!   a canonical Klaviyo event
//! - **Delivery**: Klaviyo Events API with bounded exponential backoff, and
//!   optional profile lookup/creation by email or customer code
//! - **Notifications**: a Discord message per processed request, success or
//!   failure, sent off the response path
//!
//! ## Usage
//!
//! ```rust,no_run
//! use frameworks_relay::{RelayConfig, RelayService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::from_env()?;
//!     let service = RelayService::new(config)?;
//!     service.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod security;
pub mod service;
pub mod webhook;

// Re-export main types for easier usage
pub use config::{ProfileStrategy, RelayConfig};
pub use error::{RelayError, RelayResult, TransformError};
pub use models::{CanonicalEvent, EventSummary, InboundEvent, OutcomeReport};
pub use service::{build_router, spawn_retention_task, AppState, RelayService};
pub use webhook::{
    AuditRecorder, DeliveryDispatcher, DiscordNotifier, EventType, FileAuditStore, KlaviyoClient,
    Notifier, PipelineOrchestrator, PipelineOutcome, ProfileResolver, RetryPolicy,
};

/// Version information for the relay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVICE_NAME: &str = "frameworks-relay";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(SERVICE_NAME, "frameworks-relay");
    }
}
