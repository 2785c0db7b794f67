//! Prometheus metrics
//!
//! Operator-facing counters for the gateway. Usage logging failures are only
//! ever visible here and in the logs, never to the caller.

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Counters exported on `/metrics`
pub struct GatewayMetrics {
    registry: Registry,
    pub http_requests: IntCounterVec,
    pub auth_failures: IntCounter,
    pub quota_rejections: IntCounter,
    pub usage_log_failures: IntCounter,
    pub metered_tokens: IntCounterVec,
    /// Metered cost in micro-USD
    pub metered_cost_micros: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("gateway_http_requests_total", "HTTP requests by route and status"),
            &["route", "status"],
        )?;
        let auth_failures = IntCounter::new(
            "gateway_auth_failures_total",
            "Requests rejected for invalid client credentials",
        )?;
        let quota_rejections = IntCounter::new(
            "gateway_quota_rejections_total",
            "Requests rejected for exceeding a monthly quota",
        )?;
        let usage_log_failures = IntCounter::new(
            "gateway_usage_log_failures_total",
            "Usage records that could not be persisted",
        )?;
        let metered_tokens = IntCounterVec::new(
            Opts::new("gateway_metered_tokens_total", "Tokens recorded by provider"),
            &["provider"],
        )?;
        let metered_cost_micros = IntCounterVec::new(
            Opts::new("gateway_metered_cost_micro_usd_total", "Cost recorded by provider in micro-USD"),
            &["provider"],
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(auth_failures.clone()))?;
        registry.register(Box::new(quota_rejections.clone()))?;
        registry.register(Box::new(usage_log_failures.clone()))?;
        registry.register(Box::new(metered_tokens.clone()))?;
        registry.register(Box::new(metered_cost_micros.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            auth_failures,
            quota_rejections,
            usage_log_failures,
            metered_tokens,
            metered_cost_micros,
        })
    }

    /// Record one metered call
    pub fn observe_metered(&self, provider: &str, tokens: u64, cost_usd: f64) {
        self.metered_tokens.with_label_values(&[provider]).inc_by(tokens);
        let micros = (cost_usd * 1_000_000.0).round();
        if micros.is_finite() && micros > 0.0 {
            self.metered_cost_micros
                .with_label_values(&[provider])
                .inc_by(micros as u64);
        }
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Middleware counting every response by matched route and status
pub async fn track_metrics(
    State(metrics): State<Arc<GatewayMetrics>>,
    request: Request,
    next: Next,
) -> Response<Body> {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics
        .http_requests
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();

    response
}
