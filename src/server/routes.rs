//! Application routing
//!
//! This module defines all HTTP routes for the application.

use axum::{
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{health, proxy};
use crate::middleware::{
    auth::{require_client_credentials, AuthState, CLIENT_ID_HEADER, CLIENT_SECRET_HEADER},
    logging::{log_request, REQUEST_ID_HEADER},
    metrics::track_metrics,
    quota::{enforce_quota, QuotaState},
};
use crate::server::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // Health and metrics routes (no authentication required)
    let ops_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/liveness", get(health::liveness))
        .route("/metrics", get(health::metrics));

    let auth_state = AuthState::new(state.registry.clone(), state.metrics.clone());
    let quota_state = QuotaState::new(state.usage_store.clone(), state.metrics.clone());

    // Layer order: last added = outermost = runs first, so auth runs before
    // the quota check. OPTIONS never gets here; the CORS layer answers it.
    let gateway_routes = Router::new()
        .route("/anthropic/messages", post(proxy::anthropic_messages))
        .route("/openai/chat/completions", post(proxy::openai_chat_completions))
        .route("/openai/embeddings", post(proxy::openai_embeddings))
        .route("/generic", post(proxy::generic))
        .route_layer(middleware::from_fn_with_state(quota_state, enforce_quota))
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            require_client_credentials,
        ));

    Router::new()
        .nest("/v1", gateway_routes)
        .merge(ops_routes)
        // Needs the matched path, so it wraps routes rather than the router
        .route_layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_metrics,
        ))
        // Apply middleware layers (last added = outermost = runs first)
        .layer(create_cors_layer())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Any origin may call the gateway; every OPTIONS request is answered here
/// with 200.
fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(CLIENT_ID_HEADER),
            HeaderName::from_static(CLIENT_SECRET_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}
