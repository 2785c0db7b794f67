//! Usage logging service
//!
//! Turns a metered upstream call into a [`UsageLogEntry`] and appends it to
//! the usage store. Logging is best-effort: by the time it runs the caller's
//! response is already decided, so a failed write is reported to operators
//! and otherwise dropped.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::db::models::{period_key, AuthenticatedClient, UsageLogEntry};
use crate::db::store::UsageStore;
use crate::middleware::metrics::GatewayMetrics;
use crate::services::pricing::PricingTable;
use crate::services::providers::TokenUsage;

/// Everything known about one successfully metered call
#[derive(Debug, Clone)]
pub struct MeteredCall<'a> {
    pub client: &'a AuthenticatedClient,
    pub endpoint: &'a str,
    pub provider: &'a str,
    pub model: &'a str,
    pub usage: TokenUsage,
    pub request_id: &'a str,
    pub upstream_status: u16,
}

/// Service for recording usage per tenant.
#[derive(Clone)]
pub struct UsageLogger {
    store: Arc<dyn UsageStore>,
    metrics: Arc<GatewayMetrics>,
}

impl UsageLogger {
    pub fn new(store: Arc<dyn UsageStore>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Build the log entry for a call, pricing it with `pricing`
    pub fn entry_for(call: &MeteredCall<'_>, pricing: &PricingTable) -> UsageLogEntry {
        let created_at = Utc::now();
        let cost_usd = pricing.cost(
            call.provider,
            call.model,
            call.usage.input_tokens,
            call.usage.output_tokens,
        );

        UsageLogEntry {
            tenant_id: call.client.id.clone(),
            endpoint: call.endpoint.to_string(),
            provider: call.provider.to_string(),
            model: call.model.to_string(),
            input_tokens: saturating_i64(call.usage.input_tokens),
            output_tokens: saturating_i64(call.usage.output_tokens),
            total_tokens: saturating_i64(call.usage.total_tokens),
            cost_usd,
            metadata: json!({
                "tenant_slug": call.client.slug,
                "endpoint": call.endpoint,
                "request_id": call.request_id,
                "upstream_status": call.upstream_status,
            }),
            created_at,
            period: period_key(created_at),
        }
    }

    /// Append an entry. Failures are logged and counted, never returned.
    pub async fn record(&self, entry: UsageLogEntry) {
        match self.store.append_usage(&entry).await {
            Ok(()) => {
                self.metrics
                    .observe_metered(&entry.provider, entry.total_tokens.max(0) as u64, entry.cost_usd);
                tracing::info!(
                    tenant_id = %entry.tenant_id,
                    endpoint = %entry.endpoint,
                    provider = %entry.provider,
                    model = %entry.model,
                    input_tokens = entry.input_tokens,
                    output_tokens = entry.output_tokens,
                    cost_usd = entry.cost_usd,
                    "Usage recorded"
                );
            }
            Err(e) => {
                self.metrics.usage_log_failures.inc();
                tracing::error!(
                    error = %e,
                    tenant_id = %entry.tenant_id,
                    endpoint = %entry.endpoint,
                    total_tokens = entry.total_tokens,
                    cost_usd = entry.cost_usd,
                    "Failed to record usage"
                );
            }
        }
    }

    /// Price and record a metered call
    pub async fn meter(&self, call: &MeteredCall<'_>, pricing: &PricingTable) {
        self.record(Self::entry_for(call, pricing)).await;
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
