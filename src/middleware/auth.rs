//! Tenant authentication middleware
//!
//! Callers identify themselves with a tenant slug and shared secret, one
//! header each. A successful check injects [`AuthenticatedClient`] into the
//! request extensions for the quota check and the handlers.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::db::models::AuthenticatedClient;
use crate::db::store::{StoreError, TenantRegistry};
use crate::error::GatewayError;
use crate::middleware::metrics::GatewayMetrics;

/// Header carrying the tenant slug
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Header carrying the tenant's shared secret
pub const CLIENT_SECRET_HEADER: &str = "x-client-secret";

// ============================================================================
// Credential Validation
// ============================================================================

/// Why authentication failed. Only logged; callers always see the same 401.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthFailure {
    MissingCredentials,
    UnknownClient,
    SecretMismatch,
    InactiveClient,
}

/// Errors from [`authenticate`]
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed: {0:?}")]
    Rejected(AuthFailure),

    #[error(transparent)]
    Registry(#[from] StoreError),
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected(_) => GatewayError::Unauthorized,
            AuthError::Registry(e) => GatewayError::Storage(e.to_string()),
        }
    }
}

/// Validate a `(slug, secret)` pair against the registry.
///
/// Secrets are compared exactly. Read-only.
pub async fn authenticate(
    registry: &dyn TenantRegistry,
    client_id: Option<&str>,
    secret: Option<&str>,
) -> Result<AuthenticatedClient, AuthError> {
    let (Some(client_id), Some(secret)) = (client_id, secret) else {
        return Err(AuthError::Rejected(AuthFailure::MissingCredentials));
    };
    if client_id.is_empty() || secret.is_empty() {
        return Err(AuthError::Rejected(AuthFailure::MissingCredentials));
    }

    let Some(tenant) = registry.find_by_slug(client_id).await? else {
        return Err(AuthError::Rejected(AuthFailure::UnknownClient));
    };

    if tenant.secret != secret {
        return Err(AuthError::Rejected(AuthFailure::SecretMismatch));
    }

    if !tenant.active {
        return Err(AuthError::Rejected(AuthFailure::InactiveClient));
    }

    Ok(AuthenticatedClient::from(&tenant))
}

/// Read the credential headers from a request
pub fn extract_credentials(headers: &HeaderMap) -> (Option<&str>, Option<&str>) {
    let read = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
    (read(CLIENT_ID_HEADER), read(CLIENT_SECRET_HEADER))
}

// ============================================================================
// Authentication Middleware
// ============================================================================

/// Authentication state required by the middleware
#[derive(Clone)]
pub struct AuthState {
    pub registry: Arc<dyn TenantRegistry>,
    pub metrics: Arc<GatewayMetrics>,
}

impl AuthState {
    pub fn new(registry: Arc<dyn TenantRegistry>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { registry, metrics }
    }
}

/// Middleware requiring valid tenant credentials
///
/// # Errors
/// - 401 Unauthorized: missing, unknown or mismatched credentials, or an
///   inactive tenant
/// - 500 Internal Server Error: registry lookup failed
pub async fn require_client_credentials(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let (client_id, secret) = extract_credentials(request.headers());

    let client = match authenticate(auth_state.registry.as_ref(), client_id, secret).await {
        Ok(client) => client,
        Err(AuthError::Rejected(failure)) => {
            auth_state.metrics.auth_failures.inc();
            tracing::warn!(
                client_id = %client_id.unwrap_or("-"),
                failure = ?failure,
                "Rejected client credentials"
            );
            return Err(GatewayError::Unauthorized);
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(tenant = %client.slug, "Client authenticated");
    request.extensions_mut().insert(client);

    Ok(next.run(request).await)
}

// ============================================================================
// Tests
// ============================================================================
