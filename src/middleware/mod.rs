//! Middleware module
//!
//! Tenant authentication, monthly quota enforcement, request logging and
//! Prometheus metrics.

pub mod auth;
pub mod logging;
pub mod metrics;
pub mod quota;

pub use auth::{require_client_credentials, AuthError, AuthState, CLIENT_ID_HEADER, CLIENT_SECRET_HEADER};
pub use logging::{log_request, RequestId, REQUEST_ID_HEADER};
pub use metrics::{track_metrics, GatewayMetrics};
pub use quota::{enforce_quota, QuotaState};
