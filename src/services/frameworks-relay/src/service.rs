//! Service wiring for the Frameworks relay
//!
//! Builds the collaborators from configuration, attaches the HTTP middleware
//! stack and runs the server until a shutdown signal arrives. When
//! `audit.prune_interval_secs` is non-zero a background task keeps the audit
//! store trimmed to `audit.retain` artifacts.

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::handlers::create_routes;
use crate::webhook::{
    DiscordNotifier, FileAuditStore, KlaviyoClient, PipelineOrchestrator, RetryPolicy,
};
use axum::http::HeaderName;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers
pub struct AppState {
    /// Immutable configuration, built once at startup
    pub config: Arc<RelayConfig>,
    /// Per-request pipeline
    pub pipeline: PipelineOrchestrator,
}

impl AppState {
    pub fn new(config: Arc<RelayConfig>, pipeline: PipelineOrchestrator) -> Self {
        Self { config, pipeline }
    }
}

/// Request ID generator producing `req-<uuid>`
#[derive(Clone, Default)]
struct RelayRequestId;

impl MakeRequestId for RelayRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = format!("req-{}", Uuid::new_v4());
        axum::http::HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Routes plus the middleware stack: request ids, request tracing and a
/// whole-request timeout
pub fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), RelayRequestId))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(TimeoutLayer::new(request_timeout));

    create_routes(state).layer(middleware)
}

/// The relay service
pub struct RelayService {
    config: Arc<RelayConfig>,
    app_state: Arc<AppState>,
    audit: FileAuditStore,
    addr: SocketAddr,
}

impl RelayService {
    /// Validate configuration and build every collaborator
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        info!("Initializing Frameworks relay");

        config.validate().map_err(RelayError::configuration)?;
        let config = Arc::new(config);

        let audit = FileAuditStore::new(config.audit.data_dir.clone());
        let klaviyo = Arc::new(KlaviyoClient::new(
            &config.klaviyo,
            RetryPolicy::from(&config.delivery),
        )?);
        let notifier = DiscordNotifier::new(&config.discord)?;
        if !notifier.is_enabled() {
            warn!("DISCORD_WEBHOOK_URL not set, chat notifications are disabled");
        }

        let pipeline = PipelineOrchestrator::new(
            Arc::new(audit.clone()),
            klaviyo.clone(),
            klaviyo,
            Arc::new(notifier),
            config.delivery.profile_strategy,
        )
        .with_delivery_deadline(config.delivery_deadline());

        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse::<SocketAddr>()
            .map_err(|e| RelayError::configuration(format!("Invalid server address: {}", e)))?;

        Ok(Self {
            app_state: Arc::new(AppState::new(config.clone(), pipeline)),
            config,
            audit,
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn router(&self) -> Router {
        build_router(self.app_state.clone())
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn start(self) -> RelayResult<()> {
        info!(
            addr = %self.addr,
            environment = %self.config.server.environment,
            profile_strategy = ?self.config.delivery.profile_strategy,
            audit_dir = %self.audit.dir().display(),
            "Starting Frameworks relay"
        );

        let retention = match self.config.audit.prune_interval_secs {
            0 => None,
            secs => Some(spawn_retention_task(
                self.audit.clone(),
                self.config.audit.retain,
                Duration::from_secs(secs),
            )),
        };

        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| RelayError::internal(format!("Failed to bind to address: {}", e)))?;

        info!("Relay listening on {}", self.addr);

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(task) = retention {
            task.abort();
        }

        if let Err(e) = result {
            error!("Server error: {}", e);
            return Err(RelayError::internal(format!("Server error: {}", e)));
        }

        info!("Relay stopped gracefully");
        Ok(())
    }
}

/// Periodically trim the audit store; the first run happens immediately
pub fn spawn_retention_task(
    store: FileAuditStore,
    retain: usize,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = store.prune(retain).await {
                warn!(error = %e, "Audit retention run failed");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
