//! Monthly quota middleware
//!
//! Runs after authentication. Tenants at or over either monthly ceiling are
//! turned away before any upstream call is made.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::db::models::AuthenticatedClient;
use crate::db::store::UsageStore;
use crate::error::GatewayError;
use crate::middleware::metrics::GatewayMetrics;
use crate::services::quota::check_limit;

/// State for the quota middleware
#[derive(Clone)]
pub struct QuotaState {
    pub store: Arc<dyn UsageStore>,
    pub metrics: Arc<GatewayMetrics>,
}

impl QuotaState {
    pub fn new(store: Arc<dyn UsageStore>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { store, metrics }
    }
}

/// Middleware rejecting tenants over their monthly quota
///
/// # Errors
/// - 429 Too Many Requests: a monthly ceiling has been reached
/// - 500 Internal Server Error: no authenticated client on the request, or
///   the aggregate could not be read
pub async fn enforce_quota(
    State(state): State<QuotaState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let client = request
        .extensions()
        .get::<AuthenticatedClient>()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("quota check ran before authentication"))?;

    let decision = check_limit(state.store.as_ref(), &client)
        .await
        .map_err(|e| GatewayError::Storage(e.to_string()))?;

    if !decision.allowed {
        state.metrics.quota_rejections.inc();
        let reason = decision
            .reason
            .unwrap_or_else(|| "monthly usage limit reached".to_string());
        return Err(GatewayError::UsageLimitExceeded(reason));
    }

    Ok(next.run(request).await)
}
