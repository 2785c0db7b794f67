//! Services module
//!
//! Pricing, provider conventions, upstream forwarding, quota admission and
//! usage logging.

pub mod forwarder;
pub mod pricing;
pub mod providers;
pub mod quota;
pub mod usage_logger;

pub use forwarder::{Forwarder, GatewayConfig, Upstream, UpstreamResponse};
pub use pricing::{ModelPrice, PricingError, PricingTable};
pub use providers::{ProviderAdapter, TokenUsage};
pub use quota::{check_limit, QuotaDecision};
pub use usage_logger::{MeteredCall, UsageLogger};
