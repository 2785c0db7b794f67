//! Upstream forwarding
//!
//! Sends a prepared JSON body to a provider and hands back whatever came
//! back. No retries and no gateway-side timeout: a slow provider holds only
//! the request that called it.

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode};
use reqwest::Client;
use serde_json::{Map, Value};

use crate::config::{Settings, UpstreamSettings};
use crate::error::GatewayError;
use crate::services::pricing::{PricingError, PricingTable};
use crate::services::providers::ProviderAdapter;

/// One upstream provider as the gateway sees it
#[derive(Debug, Clone)]
pub struct Upstream {
    pub adapter: ProviderAdapter,
    /// Provider name used for pricing and usage records
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_model: String,
}

impl Upstream {
    pub fn new(adapter: ProviderAdapter, settings: &UpstreamSettings) -> Self {
        Self {
            adapter,
            name: settings.name.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            default_model: settings.default_model.clone(),
        }
    }

    /// Full URL for a path below the provider's base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Immutable routing and pricing configuration, built once at startup
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub anthropic: Upstream,
    pub openai: Upstream,
    pub openai_embedding_model: String,
    pub generic: Upstream,
    pub pricing: PricingTable,
}

impl GatewayConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, PricingError> {
        let pricing = match &settings.pricing_file {
            Some(path) => PricingTable::with_overrides_file(&settings.primary_provider, path)?,
            None => PricingTable::builtin(&settings.primary_provider)?,
        };

        Ok(Self {
            anthropic: Upstream::new(ProviderAdapter::Anthropic, &settings.anthropic),
            openai: Upstream::new(ProviderAdapter::OpenAi, &settings.openai),
            openai_embedding_model: settings.openai_embedding_model.clone(),
            generic: Upstream::new(ProviderAdapter::OpenAiCompatible, &settings.generic),
            pricing,
        })
    }
}

/// Raw upstream reply, passed back to the caller unchanged
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Body parsed as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// HTTP client for provider calls
#[derive(Clone)]
pub struct Forwarder {
    client: Client,
}

impl Forwarder {
    pub fn new() -> Result<Self, GatewayError> {
        let client = Client::builder()
            .build()
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// POST `body` to `path` on `upstream` with the provider's auth headers.
    ///
    /// Any HTTP response, including provider errors, is returned as-is.
    /// Only a failure to get a response at all is an error.
    pub async fn forward(
        &self,
        upstream: &Upstream,
        path: &str,
        body: &Map<String, Value>,
    ) -> Result<UpstreamResponse, GatewayError> {
        let api_key = upstream.api_key.as_deref().ok_or_else(|| {
            GatewayError::Upstream(format!("provider '{}' is not configured", upstream.name))
        })?;

        let url = upstream.url(path);
        let headers = upstream.adapter.auth_headers(api_key)?;

        tracing::debug!(provider = %upstream.name, url = %url, "Forwarding request upstream");

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok());
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(
                provider = %upstream.name,
                status = status.as_u16(),
                "Upstream returned an error status"
            );
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_url_joins_cleanly() {
        let settings = UpstreamSettings {
            name: "openai".to_string(),
            base_url: "https://api.openai.com/".to_string(),
            api_key: None,
            default_model: "gpt-4o-mini".to_string(),
        };
        let upstream = Upstream::new(ProviderAdapter::OpenAi, &settings);
        assert_eq!(upstream.url("/v1/chat/completions"), "https://api.openai.com/v1/chat/completions");
        assert_eq!(upstream.url("v1/embeddings"), "https://api.openai.com/v1/embeddings");
    }

    #[test]
    fn test_gateway_config_from_default_settings() {
        let config = GatewayConfig::from_settings(&Settings::default()).unwrap();
        assert_eq!(config.anthropic.adapter, ProviderAdapter::Anthropic);
        assert_eq!(config.generic.adapter, ProviderAdapter::OpenAiCompatible);
        assert_eq!(config.generic.name, "openrouter");
        assert!(config.openai.api_key.is_none());
    }

    #[tokio::test]
    async fn test_forward_without_api_key_fails_before_network() {
        let config = GatewayConfig::from_settings(&Settings::default()).unwrap();
        let forwarder = Forwarder::new().unwrap();
        let err = forwarder
            .forward(&config.openai, "v1/chat/completions", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
    }

    #[test]
    fn test_upstream_response_json() {
        let response = UpstreamResponse {
            status: StatusCode::OK,
            content_type: None,
            body: Bytes::from_static(b"not json"),
        };
        assert!(response.json().is_none());
    }
}
