//! HTTP request handlers.

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    response::{sse::Sse, IntoResponse, Response},
    Json,
};
use futures::StreamExt;

use super::server::{AppState, RequestId};
use super::stream::sse_events;
use super::types::{ChatRequest, ChatResponse};
use crate::error::{Error, Result};
use crate::upstream::FragmentStream;

/// Handle POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(request) = payload?;
    request.validate()?;
    if request.stream {
        return Err(Error::InvalidMode(
            "Streaming is not supported on this endpoint, use /api/chat/stream".to_string(),
        ));
    }

    let completion = request.to_completion(&state.config.upstream.model);
    tracing::info!(
        request_id = %request_id.0,
        model = %completion.model,
        turns = completion.messages.len(),
        "Received chat request"
    );

    let text = state.upstream.generate(completion).await.map_err(|e| {
        tracing::error!(request_id = %request_id.0, error = %e, "Chat request failed");
        e
    })?;

    Ok(Json(ChatResponse { text }))
}

/// Handle POST /api/chat/stream
///
/// Once the mode check passes the response is always an SSE stream; failures
/// opening the upstream are reported as its single `{"error"}` event.
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;
    request.validate()?;
    if !request.stream {
        return Err(Error::InvalidMode(
            "This endpoint only supports streaming, use /api/chat".to_string(),
        ));
    }

    let completion = request.to_completion(&state.config.upstream.model);
    tracing::info!(
        request_id = %request_id.0,
        model = %completion.model,
        turns = completion.messages.len(),
        "Received streaming chat request"
    );

    let fragments: FragmentStream = match state.upstream.generate_stream(completion).await {
        Ok(fragments) => fragments,
        Err(e) => {
            tracing::error!(request_id = %request_id.0, error = %e, "Failed to open upstream stream");
            futures::stream::once(async move { Err(e) }).boxed()
        }
    };

    let events = sse_events(fragments, state.config.stream.pacing());
    Ok(Sse::new(events).into_response())
}

/// Handle GET /
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "chatrelay streaming chat completion proxy",
        "default_model": state.config.upstream.model,
        "api_configured": state.upstream.api_configured(),
    }))
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "default_model": state.config.upstream.model,
        "api_configured": state.upstream.api_configured(),
    }))
}
