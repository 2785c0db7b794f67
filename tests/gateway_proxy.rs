use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use httpmock::Method::POST;
use httpmock::MockServer;
use llm_metering_gateway::config::Settings;
use llm_metering_gateway::db::{
    current_period_key, SqliteStore, TenantClient, UsageLogEntry, UsageStore,
};
use llm_metering_gateway::server::{routes::create_router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

struct Harness {
    app: Router,
    store: Arc<SqliteStore>,
    _dir: TempDir,
}

fn tenant(slug: &str, secret: &str, token_limit: i64, cost_limit: f64) -> TenantClient {
    TenantClient {
        id: format!("tenant-{}", slug),
        slug: slug.to_string(),
        secret: secret.to_string(),
        active: true,
        monthly_token_limit: token_limit,
        monthly_cost_limit_usd: cost_limit,
        created_at: Utc::now(),
    }
}

fn settings_for(upstream: &MockServer) -> Settings {
    let mut settings = Settings::default();
    settings.anthropic.base_url = upstream.base_url();
    settings.anthropic.api_key = Some("sk-ant-test".to_string());
    settings.openai.base_url = upstream.base_url();
    settings.openai.api_key = Some("sk-openai-test".to_string());
    settings.generic.base_url = upstream.base_url();
    settings.generic.api_key = Some("sk-generic-test".to_string());
    settings
}

async fn harness_with(settings: Settings, tenants: &[TenantClient]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}/gateway.db", dir.path().display());
    let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
    store.migrate().await.unwrap();
    for tenant in tenants {
        store.upsert_tenant(tenant).await.unwrap();
    }

    let state = AppState::from_parts(Arc::new(settings), store.clone(), store.clone()).unwrap();

    Harness {
        app: create_router(state),
        store,
        _dir: dir,
    }
}

async fn harness(upstream: &MockServer, tenants: &[TenantClient]) -> Harness {
    harness_with(settings_for(upstream), tenants).await
}

async fn seed_usage(store: &SqliteStore, tenant_id: &str, tokens: i64, cost_usd: f64) {
    store
        .append_usage(&UsageLogEntry {
            tenant_id: tenant_id.to_string(),
            endpoint: "openai.chat_completions".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            input_tokens: tokens,
            output_tokens: 0,
            total_tokens: tokens,
            cost_usd,
            metadata: json!({}),
            created_at: Utc::now(),
            period: current_period_key(),
        })
        .await
        .unwrap();
}

fn post(uri: &str, slug: &str, secret: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-client-id", slug)
        .header("x-client-secret", secret)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn token_quota_allows_last_call_then_blocks() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer sk-openai-test");
        then.status(200)
            .header("content-type", "application/json")
            .body(
                r#"{"id":"chatcmpl-1","usage":{"prompt_tokens":6,"completion_tokens":4,"total_tokens":10}}"#,
            );
    });

    let acme = tenant("acme", "s3cret", 1000, 100.0);
    let h = harness(&upstream, &[acme.clone()]).await;
    seed_usage(&h.store, &acme.id, 999, 0.0).await;

    let body = json!({"model": "gpt-4o-mini", "messages": [{"role": "user", "content": "hi"}]});
    let (status, value) = send(&h.app, post("/v1/openai/chat/completions", "acme", "s3cret", body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["id"], "chatcmpl-1");

    let aggregate = h
        .store
        .monthly_aggregate(&acme.id, &current_period_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(aggregate.total_tokens, 1009);
    assert_eq!(aggregate.total_requests, 2);

    let (status, value) = send(&h.app, post("/v1/openai/chat/completions", "acme", "s3cret", body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(value["error"], "Usage limit exceeded");
    assert_eq!(value["message"], "token limit reached: 1009/1000");

    mock.assert_calls(1);
}

#[tokio::test]
async fn cost_quota_blocks_after_priced_anthropic_call() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages")
            .header("x-api-key", "sk-ant-test")
            .header("anthropic-version", "2023-06-01");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"id":"msg_1","usage":{"input_tokens":1000,"output_tokens":500}}"#);
    });

    let acme = tenant("acme", "s3cret", 1_000_000, 0.01);
    let h = harness(&upstream, &[acme.clone()]).await;
    seed_usage(&h.store, &acme.id, 10, 0.009).await;

    let body = json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 16,
        "messages": [{"role": "user", "content": "hi"}]
    });
    let (status, _) = send(&h.app, post("/v1/anthropic/messages", "acme", "s3cret", body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let entries = h.store.usage_entries(&acme.id).await.unwrap();
    let entry = entries.last().unwrap();
    assert_eq!(entry.endpoint, "anthropic.messages");
    assert_eq!(entry.provider, "anthropic");
    assert_eq!(entry.total_tokens, 1500);
    // 1000 * $3/1M + 500 * $15/1M
    assert!((entry.cost_usd - 0.0105).abs() < 1e-12);

    let (status, value) = send(&h.app, post("/v1/anthropic/messages", "acme", "s3cret", body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(value["message"], "cost limit reached: 0.0195/0.0100");

    mock.assert_calls(1);
}

#[tokio::test]
async fn missing_secret_is_rejected_before_upstream() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200).body(r#"{"usage":{"prompt_tokens":1}}"#);
    });

    let acme = tenant("acme", "s3cret", 1000, 5.0);
    let h = harness(&upstream, &[acme.clone()]).await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/openai/chat/completions")
        .header("content-type", "application/json")
        .header("x-client-id", "acme")
        .body(Body::from(json!({"messages": []}).to_string()))
        .unwrap();
    let (status, value) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(value, json!({"error": "Unauthorized", "message": "Invalid client credentials"}));
    mock.assert_calls(0);
    assert!(h.store.usage_entries(&acme.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn wrong_secret_and_inactive_tenant_get_the_same_401() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST);
        then.status(200).body("{}");
    });

    let mut dormant = tenant("dormant", "zzz", 1000, 5.0);
    dormant.active = false;
    let h = harness(&upstream, &[tenant("acme", "s3cret", 1000, 5.0), dormant]).await;

    let body = json!({"messages": []});
    let (status, wrong) = send(&h.app, post("/v1/openai/chat/completions", "acme", "nope", body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, inactive) = send(&h.app, post("/v1/openai/chat/completions", "dormant", "zzz", body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, inactive);

    let (status, _) = send(&h.app, post("/v1/openai/chat/completions", "nobody", "s3cret", body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    mock.assert_calls(0);
}

#[tokio::test]
async fn generic_endpoint_field_routes_and_is_stripped() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST)
            .path("/v1/embeddings")
            .header("authorization", "Bearer sk-generic-test")
            .json_body(json!({"model": "some/embedder", "input": "hello"}));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"data":[],"usage":{"prompt_tokens":4,"total_tokens":4}}"#);
    });

    let acme = tenant("acme", "s3cret", 1000, 5.0);
    let h = harness(&upstream, &[acme.clone()]).await;

    let body = json!({"endpoint": "embeddings", "model": "some/embedder", "input": "hello"});
    let (status, _) = send(&h.app, post("/v1/generic", "acme", "s3cret", body)).await;
    assert_eq!(status, StatusCode::OK);
    mock.assert_calls(1);

    let entries = h.store.usage_entries(&acme.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].endpoint, "generic.embeddings");
    assert_eq!(entries[0].provider, "openrouter");
    assert_eq!(entries[0].output_tokens, 0);
    // unknown provider falls back to the primary provider's default price
    assert!((entries[0].cost_usd - 4.0 / 1e6 * 0.15).abs() < 1e-15);
}

#[tokio::test]
async fn unsupported_generic_endpoint_is_a_500() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST);
        then.status(200).body("{}");
    });

    let h = harness(&upstream, &[tenant("acme", "s3cret", 1000, 5.0)]).await;

    let body = json!({"endpoint": "../admin", "messages": []});
    let (status, value) = send(&h.app, post("/v1/generic", "acme", "s3cret", body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(value["message"].as_str().unwrap().contains("unsupported endpoint"));
    mock.assert_calls(0);
}

#[tokio::test]
async fn default_model_is_inserted_when_omitted() {
    let upstream = MockServer::start();
    let chat = upstream.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .json_body(json!({"model": "gpt-4o-mini", "messages": [{"role": "user", "content": "hi"}]}));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#);
    });
    let embeddings = upstream.mock(|when, then| {
        when.method(POST)
            .path("/v1/embeddings")
            .json_body(json!({"model": "text-embedding-3-small", "input": "hi"}));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"usage":{"prompt_tokens":1,"total_tokens":1}}"#);
    });

    let acme = tenant("acme", "s3cret", 1000, 5.0);
    let h = harness(&upstream, &[acme.clone()]).await;

    let (status, _) = send(
        &h.app,
        post(
            "/v1/openai/chat/completions",
            "acme",
            "s3cret",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&h.app, post("/v1/openai/embeddings", "acme", "s3cret", json!({"input": "hi"}))).await;
    assert_eq!(status, StatusCode::OK);

    chat.assert_calls(1);
    embeddings.assert_calls(1);

    let entries = h.store.usage_entries(&acme.id).await.unwrap();
    let models: Vec<&str> = entries.iter().map(|e| e.model.as_str()).collect();
    assert_eq!(models, vec!["gpt-4o-mini", "text-embedding-3-small"]);
    assert_eq!(entries[1].endpoint, "openai.embeddings");
}

#[tokio::test]
async fn upstream_error_passes_through_unmetered() {
    let upstream = MockServer::start();
    let error_body = r#"{"error":{"type":"invalid_request_error","message":"max_tokens required"}}"#;
    upstream.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(400)
            .header("content-type", "application/json")
            .body(error_body);
    });

    let acme = tenant("acme", "s3cret", 1000, 5.0);
    let h = harness(&upstream, &[acme.clone()]).await;

    let response = h
        .app
        .clone()
        .oneshot(post("/v1/anthropic/messages", "acme", "s3cret", json!({"messages": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["content-type"], "application/json");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], error_body.as_bytes());

    assert!(h.store.usage_entries(&acme.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn success_without_usage_is_not_metered() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"id":"chatcmpl-2","choices":[]}"#);
    });

    let acme = tenant("acme", "s3cret", 1000, 5.0);
    let h = harness(&upstream, &[acme.clone()]).await;

    let (status, value) = send(&h.app, post("/v1/openai/chat/completions", "acme", "s3cret", json!({"messages": []}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["id"], "chatcmpl-2");
    assert!(h.store.usage_entries(&acme.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn usage_metadata_carries_request_context() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#);
    });

    let acme = tenant("acme", "s3cret", 1000, 5.0);
    let h = harness(&upstream, &[acme.clone()]).await;

    let mut request = post("/v1/openai/chat/completions", "acme", "s3cret", json!({"messages": []}));
    request
        .headers_mut()
        .insert("x-request-id", "req-abc".parse().unwrap());
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-abc");

    let entries = h.store.usage_entries(&acme.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].metadata["tenant_slug"], "acme");
    assert_eq!(entries[0].metadata["endpoint"], "openai.chat_completions");
    assert_eq!(entries[0].metadata["request_id"], "req-abc");
    assert_eq!(entries[0].metadata["upstream_status"], 200);
}

#[tokio::test]
async fn unreachable_or_unconfigured_upstream_is_a_500() {
    let upstream = MockServer::start();
    let mut settings = settings_for(&upstream);
    settings.generic.base_url = "http://127.0.0.1:1".to_string();
    settings.anthropic.api_key = None;

    let acme = tenant("acme", "s3cret", 1000, 5.0);
    let h = harness_with(settings, &[acme.clone()]).await;

    let (status, value) = send(&h.app, post("/v1/generic", "acme", "s3cret", json!({"messages": []}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(value["error"], "Internal server error");

    let (status, value) = send(&h.app, post("/v1/anthropic/messages", "acme", "s3cret", json!({"messages": []}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(value["message"].as_str().unwrap().contains("not configured"));

    assert!(h.store.usage_entries(&acme.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_500() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST);
        then.status(200).body("{}");
    });

    let h = harness(&upstream, &[tenant("acme", "s3cret", 1000, 5.0)]).await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/openai/chat/completions")
        .header("x-client-id", "acme")
        .header("x-client-secret", "s3cret")
        .body(Body::from("{\"messages\": ["))
        .unwrap();
    let (status, value) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(value["error"].is_string());
    assert!(value["message"].is_string());
    mock.assert_calls(0);
}

#[tokio::test]
async fn options_preflight_is_answered_without_credentials() {
    let upstream = MockServer::start();
    let h = harness(&upstream, &[]).await;

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/v1/openai/chat/completions")
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type,x-client-id,x-client-secret")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let allowed = response.headers()["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(allowed.contains("x-client-id"));
    assert!(allowed.contains("x-client-secret"));

    for uri in ["/v1/anthropic/messages", "/v1/generic", "/v1/openai/embeddings"] {
        let request = Request::builder()
            .method("OPTIONS")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

#[tokio::test]
async fn operational_endpoints_need_no_credentials() {
    let upstream = MockServer::start();
    let h = harness(&upstream, &[]).await;

    let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

    let (status, value) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["storage_backend"], "sqlite");

    let (status, value) = send(&h.app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["ready"], true);

    let (status, value) = send(&h.app, get("/liveness")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["alive"], true);

    let response = h.app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec(),
    )
    .unwrap();
    assert!(text.contains("gateway_http_requests_total"));
    assert!(text.contains("route=\"/health\""));
}
