use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, Method},
    response::{Html, IntoResponse, Response},
    Json,
};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    errors::{RelayError, ValidationError},
    models::{ChatRequest, ChatResponse},
    state::AppState,
};

pub const CHAT_PATH: &str = "/api/chat";

const INDEX_HTML: &str = include_str!("../static/index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => {
            warn!(error = %error, "metrics render failed");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Chat relay endpoint; mounted for every method so that the method check
/// answers with the JSON error body as well.
pub async fn chat(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    let started = Instant::now();
    let _inflight = state.metrics.inflight_guard();
    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id);

    let response = match process_chat(&state, &method, &body).instrument(span.clone()).await {
        Ok(payload) => Json(payload).into_response(),
        Err(error) => {
            state.metrics.observe_error(error.kind());
            span.in_scope(|| {
                warn!(
                    kind = error.kind(),
                    status = error.status_code().as_u16(),
                    error = %error,
                    "chat request failed"
                );
            });
            error.into_response()
        }
    };

    state.metrics.observe_request(
        CHAT_PATH,
        method.as_str(),
        response.status().as_u16(),
        started.elapsed(),
    );

    response
}

async fn process_chat(
    state: &AppState,
    method: &Method,
    body: &[u8],
) -> Result<ChatResponse, RelayError> {
    if *method != Method::POST {
        return Err(ValidationError::MethodNotAllowed(method.to_string()).into());
    }

    let message = ChatRequest::from_body(body)?;
    info!(chars = message.chars().count(), "chat request accepted");

    state.relay.relay(&message).await
}
