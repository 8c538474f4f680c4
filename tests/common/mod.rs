//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use axum::body::Body;
use http::Request;

use chatrelay::config::{ApiKey, Config, LoggingConfig, ServerConfig, StreamConfig, UpstreamConfig};
use chatrelay::proxy::{create_router, AppState};

pub const TEST_API_KEY: &str = "sk-test-key";

/// Config pointing at `base_url`, with pacing disabled so tests run fast.
pub fn test_config(base_url: &str, api_key: Option<&str>) -> Config {
    Config {
        server: ServerConfig::default(),
        upstream: UpstreamConfig {
            base_url: base_url.to_string(),
            api_key: api_key.map(ApiKey::from),
            model: "qwen-turbo".to_string(),
            ..UpstreamConfig::default()
        },
        stream: StreamConfig { pacing_ms: 0 },
        logging: LoggingConfig::default(),
    }
}

/// Router backed by the real reqwest upstream client.
pub fn setup_app(config: Config) -> axum::Router {
    let state = AppState::from_config(config).expect("build app state");
    create_router(state)
}

/// JSON POST request.
pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// POST with a raw body declared as JSON.
pub fn post_raw(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Parse the response body as JSON and return (status_code, json_value).
pub async fn parse_body(response: axum::response::Response) -> (http::StatusCode, serde_json::Value) {
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap_or_default();
    (status, json)
}

/// Read an SSE response to completion and return each event's JSON data.
pub async fn parse_sse(response: axum::response::Response) -> Vec<serde_json::Value> {
    let body_bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    let text = String::from_utf8(body_bytes.to_vec()).expect("utf-8 body");

    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).expect("event data is JSON"))
        .collect()
}

/// Build an upstream SSE body from `data:` payloads.
pub fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|p| format!("data: {}\n\n", p))
        .collect()
}

/// A `data:` payload carrying one delta fragment.
pub fn delta(text: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
    })
    .to_string()
}
