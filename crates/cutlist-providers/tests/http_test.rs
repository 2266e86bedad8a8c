//! Providers against a local stub server.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use cutlist_core::types::{ParseOptions, ProviderFailure};
use cutlist_core::ProviderSettings;
use cutlist_providers::{AnthropicExtractor, OllamaExtractor, OpenAiExtractor, PartExtractor};

#[derive(Clone)]
struct Stub {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

async fn respond(State(stub): State<Stub>, headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    stub.seen.lock().unwrap().push((headers, body));
    (stub.status, Json(stub.reply.clone()))
}

/// Serve `reply` with `status` on every provider path and return the base URL.
async fn serve(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<(HeaderMap, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let stub = Stub {
        status,
        reply,
        seen: seen.clone(),
    };
    let app = Router::new()
        .route("/messages", post(respond))
        .route("/chat/completions", post(respond))
        .route("/api/chat", post(respond))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), seen)
}

fn settings(base_url: &str) -> ProviderSettings {
    ProviderSettings {
        api_key: Some("test-key".to_string()),
        base_url: Some(base_url.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_anthropic_truncated_response_is_recovered() {
    let (url, seen) = serve(
        StatusCode::OK,
        json!({
            "content": [{"type": "text", "text": "```json\n[{\"l\":600,\"w\":400,\"q\":2},{\"l\":300,\"w\""}],
            "stop_reason": "max_tokens"
        }),
    )
    .await;
    let provider = AnthropicExtractor::new(&settings(&url)).unwrap();

    let result = provider.parse_text("2 sides 600x400", &ParseOptions::default()).await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.provider, "anthropic");
    assert_eq!(result.parts[0].length_mm, 600.0);
    assert_eq!(result.parts[0].quantity, 2);

    let seen = seen.lock().unwrap();
    let (headers, body) = &seen[0];
    assert_eq!(headers["x-api-key"], "test-key");
    assert_eq!(headers["anthropic-version"], "2023-06-01");
    assert!(body["messages"][0]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("2 sides 600x400"));
}

#[tokio::test]
async fn test_rate_limit_is_transient() {
    let (url, _) = serve(
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"message": "Rate limit reached"}}),
    )
    .await;
    let provider = OpenAiExtractor::new(&settings(&url)).unwrap();

    let result = provider.parse_text("2 @ 600 x 400", &ParseOptions::default()).await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(ProviderFailure::Transient));
    assert!(result.errors[0].contains("Rate limit reached"));
}

#[tokio::test]
async fn test_bad_request_is_rejected() {
    let (url, _) = serve(StatusCode::BAD_REQUEST, json!({"error": "invalid model"})).await;
    let provider = OllamaExtractor::new(&settings(&url)).unwrap();

    let result = provider.parse_text("2 @ 600 x 400", &ParseOptions::default()).await;
    assert_eq!(result.failure, Some(ProviderFailure::Rejected));
}

#[tokio::test]
async fn test_openai_refusal_is_rejected() {
    let (url, seen) = serve(
        StatusCode::OK,
        json!({"choices": [{"message": {"content": null, "refusal": "cannot help"}, "finish_reason": "stop"}]}),
    )
    .await;
    let provider = OpenAiExtractor::new(&settings(&url)).unwrap();

    let result = provider.parse_text("anything", &ParseOptions::default()).await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(ProviderFailure::Rejected));

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0["authorization"], "Bearer test-key");
}

#[tokio::test]
async fn test_ollama_image_goes_in_images_field() {
    let (url, seen) = serve(
        StatusCode::OK,
        json!({"message": {"role": "assistant", "content": "[{\"l\":800,\"w\":300,\"t\":18}]"}, "done": true}),
    )
    .await;
    let provider = OllamaExtractor::new(&settings(&url)).unwrap();

    let result = provider
        .parse_image(b"\x89PNG", "image/png", &ParseOptions::default())
        .await;
    assert!(result.success);
    assert_eq!(result.parts[0].thickness_mm, 18.0);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].1["messages"][1]["images"][0], "iVBORw==");
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let provider = OpenAiExtractor::new(&settings("http://127.0.0.1:1")).unwrap();
    let result = provider.parse_text("2 @ 600 x 400", &ParseOptions::default()).await;
    assert_eq!(result.failure, Some(ProviderFailure::Transient));
}

#[tokio::test]
async fn test_unparseable_body_is_rejected() {
    let (url, _) = serve(StatusCode::OK, json!({"content": "not a list"})).await;
    let provider = AnthropicExtractor::new(&settings(&url)).unwrap();
    let result = provider.parse_text("x", &ParseOptions::default()).await;
    assert_eq!(result.failure, Some(ProviderFailure::Rejected));
}
