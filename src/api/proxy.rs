//! Metered proxy endpoints
//!
//! Each handler runs behind the credential and quota middleware, so by the
//! time it executes the tenant is known and under quota. The handler fills
//! in a default model, forwards the body, hands the provider's reply back
//! unchanged and, for successful replies that report usage, records the
//! cost against the tenant.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::Response,
    Extension,
};
use serde_json::{Map, Value};

use crate::db::models::AuthenticatedClient;
use crate::error::GatewayError;
use crate::middleware::logging::RequestId;
use crate::server::state::AppState;
use crate::services::forwarder::{Upstream, UpstreamResponse};
use crate::services::providers::DEFAULT_GENERIC_ENDPOINT;
use crate::services::usage_logger::MeteredCall;

/// The metered endpoints the gateway exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    AnthropicMessages,
    OpenAiChatCompletions,
    OpenAiEmbeddings,
    Generic,
}

/// Where one request goes and how it is labelled
#[derive(Debug)]
struct Target<'a> {
    upstream: &'a Upstream,
    path: String,
    kind: String,
    model: String,
}

impl Endpoint {
    /// Pick the upstream, fill in the model and strip gateway-only fields
    fn resolve<'a>(
        self,
        state: &'a AppState,
        body: &mut Map<String, Value>,
    ) -> Result<Target<'a>, GatewayError> {
        let config = &state.config;
        let target = match self {
            Endpoint::AnthropicMessages => {
                let upstream = &config.anthropic;
                Target {
                    model: upstream.adapter.resolve_model(body, &upstream.default_model),
                    upstream,
                    path: "v1/messages".to_string(),
                    kind: "anthropic.messages".to_string(),
                }
            }
            Endpoint::OpenAiChatCompletions => {
                let upstream = &config.openai;
                Target {
                    model: upstream.adapter.resolve_model(body, &upstream.default_model),
                    upstream,
                    path: "v1/chat/completions".to_string(),
                    kind: "openai.chat_completions".to_string(),
                }
            }
            Endpoint::OpenAiEmbeddings => {
                let upstream = &config.openai;
                Target {
                    model: upstream.adapter.resolve_model(body, &config.openai_embedding_model),
                    upstream,
                    path: "v1/embeddings".to_string(),
                    kind: "openai.embeddings".to_string(),
                }
            }
            Endpoint::Generic => {
                let upstream = &config.generic;
                let route = upstream
                    .adapter
                    .take_route(body)?
                    .unwrap_or_else(|| DEFAULT_GENERIC_ENDPOINT.to_string());
                Target {
                    model: upstream.adapter.resolve_model(body, &upstream.default_model),
                    upstream,
                    path: format!("v1/{}", route),
                    kind: format!("generic.{}", route.replace('/', "_")),
                }
            }
        };

        Ok(target)
    }
}

/// POST /v1/anthropic/messages
pub async fn anthropic_messages(
    State(state): State<AppState>,
    Extension(client): Extension<AuthenticatedClient>,
    request_id: Option<Extension<RequestId>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    proxy(&state, Endpoint::AnthropicMessages, &client, request_id, &body).await
}

/// POST /v1/openai/chat/completions
pub async fn openai_chat_completions(
    State(state): State<AppState>,
    Extension(client): Extension<AuthenticatedClient>,
    request_id: Option<Extension<RequestId>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    proxy(&state, Endpoint::OpenAiChatCompletions, &client, request_id, &body).await
}

/// POST /v1/openai/embeddings
pub async fn openai_embeddings(
    State(state): State<AppState>,
    Extension(client): Extension<AuthenticatedClient>,
    request_id: Option<Extension<RequestId>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    proxy(&state, Endpoint::OpenAiEmbeddings, &client, request_id, &body).await
}

/// POST /v1/generic
///
/// The optional `endpoint` body field picks the provider sub-endpoint and is
/// removed before forwarding.
pub async fn generic(
    State(state): State<AppState>,
    Extension(client): Extension<AuthenticatedClient>,
    request_id: Option<Extension<RequestId>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    proxy(&state, Endpoint::Generic, &client, request_id, &body).await
}

async fn proxy(
    state: &AppState,
    endpoint: Endpoint,
    client: &AuthenticatedClient,
    request_id: Option<Extension<RequestId>>,
    raw_body: &Bytes,
) -> Result<Response, GatewayError> {
    let request_id = request_id.map(|Extension(id)| id).unwrap_or_default();
    let mut body = parse_body(raw_body)?;
    let target = endpoint.resolve(state, &mut body)?;

    let upstream_response = state
        .forwarder
        .forward(target.upstream, &target.path, &body)
        .await
        .map_err(|e| {
            tracing::error!(
                request_id = %request_id,
                tenant = %client.slug,
                endpoint = %target.kind,
                error = %e,
                "Upstream call failed"
            );
            e
        })?;

    if upstream_response.status.is_success() {
        meter(state, &target, client, &request_id, &upstream_response).await;
    }

    passthrough(upstream_response)
}

/// Record usage for a successful reply. Replies without a usage object are
/// not metered.
async fn meter(
    state: &AppState,
    target: &Target<'_>,
    client: &AuthenticatedClient,
    request_id: &RequestId,
    response: &UpstreamResponse,
) {
    let usage = response
        .json()
        .and_then(|json| target.upstream.adapter.extract_usage(&json));

    let Some(usage) = usage else {
        tracing::warn!(
            request_id = %request_id,
            tenant = %client.slug,
            endpoint = %target.kind,
            "Upstream reply carried no usage; call not metered"
        );
        return;
    };

    let call = MeteredCall {
        client,
        endpoint: &target.kind,
        provider: &target.upstream.name,
        model: &target.model,
        usage,
        request_id: request_id.as_str(),
        upstream_status: response.status.as_u16(),
    };
    state.usage_logger.meter(&call, &state.config.pricing).await;
}

fn parse_body(raw: &Bytes) -> Result<Map<String, Value>, GatewayError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GatewayError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(GatewayError::InvalidRequest(format!(
            "request body is not valid JSON: {}",
            e
        ))),
    }
}

fn passthrough(upstream: UpstreamResponse) -> Result<Response, GatewayError> {
    let mut builder = Response::builder().status(upstream.status);
    if let Some(content_type) = upstream.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(upstream.body))
        .map_err(|e| GatewayError::Internal(e.into()))
}
