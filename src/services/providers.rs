//! Provider adapters
//!
//! Upstream providers differ in three ways the gateway cares about: how the
//! API key is presented, which model to use when the caller omits one, and
//! where token usage lives in the response. [`ProviderAdapter`] is the closed
//! set of those conventions.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Anthropic API version sent on every Anthropic call
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Body field naming the sub-endpoint for the generic provider
pub const ROUTING_FIELD: &str = "endpoint";

/// Sub-endpoint used by the generic provider when none is requested
pub const DEFAULT_GENERIC_ENDPOINT: &str = "chat/completions";

/// Sub-endpoints the generic provider may be routed to
pub const GENERIC_ENDPOINTS: &[&str] = &["chat/completions", "completions", "embeddings"];

/// Token counts reported by an upstream response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Upstream protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAdapter {
    /// `x-api-key` auth, `{input_tokens, output_tokens}` usage
    Anthropic,
    /// Bearer auth, `{prompt_tokens, completion_tokens, total_tokens}` usage
    OpenAi,
    /// Any OpenAI-compatible API; same conventions as OpenAI plus a
    /// body-level routing field
    OpenAiCompatible,
}

impl ProviderAdapter {
    /// Headers that authenticate the gateway with the upstream, in the
    /// HTTP client's header types
    pub fn auth_headers(&self, api_key: &str) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        let invalid_key = |_| {
            GatewayError::Internal(anyhow::anyhow!(
                "configured upstream API key is not a valid header value"
            ))
        };

        match self {
            ProviderAdapter::Anthropic => {
                headers.insert(
                    HeaderName::from_static("x-api-key"),
                    HeaderValue::from_str(api_key).map_err(invalid_key)?,
                );
                headers.insert(
                    HeaderName::from_static("anthropic-version"),
                    HeaderValue::from_static(ANTHROPIC_VERSION),
                );
            }
            ProviderAdapter::OpenAi | ProviderAdapter::OpenAiCompatible => {
                let mut value =
                    HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(invalid_key)?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }

        Ok(headers)
    }

    /// Fill in `model` when the caller omitted it or sent an empty string.
    /// Returns the model the upstream will be asked for.
    pub fn resolve_model(&self, body: &mut Map<String, Value>, default_model: &str) -> String {
        let requested = body
            .get("model")
            .and_then(Value::as_str)
            .filter(|model| !model.trim().is_empty())
            .map(str::to_string);

        match requested {
            Some(model) => model,
            None => {
                body.insert("model".to_string(), Value::String(default_model.to_string()));
                default_model.to_string()
            }
        }
    }

    /// Remove the routing field and validate it against the allow-list.
    ///
    /// Only the generic provider routes on the body; for the others the
    /// field is left untouched and `None` is returned.
    pub fn take_route(&self, body: &mut Map<String, Value>) -> Result<Option<String>, GatewayError> {
        if *self != ProviderAdapter::OpenAiCompatible {
            return Ok(None);
        }

        let requested = match body.remove(ROUTING_FIELD) {
            None | Some(Value::Null) => return Ok(Some(DEFAULT_GENERIC_ENDPOINT.to_string())),
            Some(Value::String(endpoint)) => endpoint,
            Some(other) => {
                return Err(GatewayError::InvalidRequest(format!(
                    "'{}' must be a string, got {}",
                    ROUTING_FIELD, other
                )))
            }
        };

        let normalized = requested.trim().trim_matches('/');
        if GENERIC_ENDPOINTS.contains(&normalized) {
            Ok(Some(normalized.to_string()))
        } else {
            Err(GatewayError::InvalidRequest(format!(
                "unsupported endpoint '{}', expected one of: {}",
                requested,
                GENERIC_ENDPOINTS.join(", ")
            )))
        }
    }

    /// Read token usage from a successful response body.
    ///
    /// Returns `None` when the usage object is absent or has no input count.
    pub fn extract_usage(&self, body: &Value) -> Option<TokenUsage> {
        let usage = body.get("usage")?.as_object()?;
        let field = |name: &str| usage.get(name).and_then(Value::as_u64);

        match self {
            ProviderAdapter::Anthropic => {
                let input_tokens = field("input_tokens")?;
                let output_tokens = field("output_tokens").unwrap_or(0);
                Some(TokenUsage {
                    input_tokens,
                    output_tokens,
                    total_tokens: input_tokens.saturating_add(output_tokens),
                })
            }
            ProviderAdapter::OpenAi | ProviderAdapter::OpenAiCompatible => {
                let input_tokens = field("prompt_tokens")?;
                let output_tokens = field("completion_tokens").unwrap_or(0);
                Some(TokenUsage {
                    input_tokens,
                    output_tokens,
                    total_tokens: field("total_tokens")
                        .unwrap_or_else(|| input_tokens.saturating_add(output_tokens)),
                })
            }
        }
    }
}
