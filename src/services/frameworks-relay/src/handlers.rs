//! HTTP handlers for the Frameworks relay
//!
//! Routes:
//! - `POST /webhook/:trigger`, guarded by the `X-API-Key` shared secret
//! - `GET /health`, unauthenticated
//! - everything else falls through to a JSON 404

use crate::models::{HealthResponse, NotFoundResponse};
use crate::security::{SecurityUtils, API_KEY_HEADER};
use crate::service::AppState;
use crate::{SERVICE_NAME, VERSION};
use axum::{
    extract::{Path, Request, State},
    http::{Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes advertised by the 404 body
pub const AVAILABLE_ROUTES: [&str; 2] = ["POST /webhook/:trigger", "GET /health"];

/// Create all routes for the relay
pub fn create_routes(state: Arc<AppState>) -> Router {
    let webhook_routes = Router::new()
        .route("/webhook/:trigger", post(webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(webhook_routes)
        .fallback(not_found)
        .with_state(state)
}

/// Reject requests without the configured `X-API-Key` before any side effect
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match SecurityUtils::verify_api_key(provided, &state.config.webhook.api_key) {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            warn!(
                path = %request.uri().path(),
                reason = rejection.error(),
                "Rejected unauthenticated webhook"
            );
            rejection.into_response()
        }
    }
}

/// Inbound webhook endpoint
async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(trigger): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    info!(trigger = %trigger, bytes = body.len(), "Received webhook");

    let raw = match serde_json::from_slice::<Value>(&body) {
        Ok(value) => value,
        Err(e) => {
            debug!(trigger = %trigger, error = %e, "Webhook body is not valid JSON");
            Value::String(String::from_utf8_lossy(&body).into_owned())
        }
    };

    debug!(
        trigger = %trigger,
        body = %SecurityUtils::sanitize_for_logging(&raw),
        "Webhook body"
    );

    let outcome = state.pipeline.handle(&trigger, raw).await;
    (outcome.status, Json(outcome.report))
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        timestamp: Utc::now(),
        version: VERSION.to_string(),
        environment: state.config.server.environment.clone(),
    })
}

/// JSON 404 for unmatched routes
async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    debug!(method = %method, path = %uri.path(), "No route matched");

    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            error: "Not found".to_string(),
            message: format!("Route {} {} not found", method, uri),
            available_routes: AVAILABLE_ROUTES.iter().map(|r| r.to_string()).collect(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::error::RelayResult;
    use crate::models::{CanonicalEvent, OutcomeReport};
    use crate::webhook::{
        AuditRecorder, DeliveryDispatcher, Notifier, PipelineOrchestrator, ProfileResolver,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use serde_json::json;
    use std::path::PathBuf;
    use tower::ServiceExt;

    struct Noop;

    #[async_trait]
    impl AuditRecorder for Noop {
        async fn persist(&self, _raw: &Value) -> RelayResult<PathBuf> {
            Ok(PathBuf::new())
        }
    }

    #[async_trait]
    impl DeliveryDispatcher for Noop {
        async fn send(&self, _event: &CanonicalEvent) -> RelayResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ProfileResolver for Noop {
        async fn resolve(&self, _email: Option<&str>, customer_code: &str) -> RelayResult<String> {
            Ok(customer_code.to_string())
        }
    }

    #[async_trait]
    impl Notifier for Noop {
        async fn notify(&self, _report: &OutcomeReport) -> RelayResult<()> {
            Ok(())
        }
    }

    fn create_test_state() -> Arc<AppState> {
        let mut config = RelayConfig::default();
        config.webhook.api_key = "test-key".to_string();
        config.server.environment = "test".to_string();

        let noop = Arc::new(Noop);
        let pipeline = PipelineOrchestrator::new(
            noop.clone(),
            noop.clone(),
            noop.clone(),
            noop,
            config.delivery.profile_strategy,
        );
        Arc::new(AppState::new(Arc::new(config), pipeline))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_routes(create_test_state());
        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], SERVICE_NAME);
        assert_eq!(body["environment"], "test");
        assert_eq!(body["version"], VERSION);
    }

    #[tokio::test]
    async fn test_not_found_lists_routes() {
        let app = create_routes(create_test_state());
        let response = app
            .oneshot(HttpRequest::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not found");
        assert_eq!(body["message"], "Route GET /nope not found");
        assert_eq!(
            body["available_routes"],
            json!(["POST /webhook/:trigger", "GET /health"])
        );
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let app = create_routes(create_test_state());
        let response = app
            .oneshot(
                HttpRequest::post("/webhook/orders")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Missing API key");
        assert_eq!(body["message"], "X-API-Key header is required");
    }

    #[tokio::test]
    async fn test_webhook_with_valid_key() {
        let app = create_routes(create_test_state());
        let payload = json!({
            "event_type": "welcome_flow",
            "data": {
                "id": "p7",
                "customer_code": "C7",
                "customer_name": "Jane",
                "branch": "Auckland",
                "created_at": "2024-01-15T10:30:00Z"
            }
        });
        let response = app
            .oneshot(
                HttpRequest::post("/webhook/signups")
                    .header("x-api-key", "test-key")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["profile_id"], "p7");
        assert_eq!(body["trigger"], "signups");
    }

    #[tokio::test]
    async fn test_invalid_json_is_rejected() {
        let app = create_routes(create_test_state());
        let response = app
            .oneshot(
                HttpRequest::post("/webhook/orders")
                    .header("x-api-key", "test-key")
                    .body(Body::from("event_type=order_invoiced"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Missing event_type or data");
        assert_eq!(body["data"], "event_type=order_invoiced");
    }
}
