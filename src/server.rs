//! HTTP surface for the webhook.
//!
//! One fallback handler owns the whole method/path table so the status codes
//! stay exact:
//!
//! | request            | response                                   |
//! |--------------------|--------------------------------------------|
//! | `GET /`            | `200` liveness text                        |
//! | `GET /setup`       | command menu registration result (JSON)    |
//! | `POST /<secret>`   | `200 OK`, `401` on path mismatch, `500`    |
//! | anything else      | `405`                                      |

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bot::{self, AppState};
use crate::commands::COMMANDS;

pub const PROBE_TEXT: &str = "Check-in relay is running.";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

async fn handle_request(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    match (&method, uri.path()) {
        (&Method::GET, "/") => (StatusCode::OK, PROBE_TEXT).into_response(),
        (&Method::GET, "/setup") => setup(&state).await,
        (&Method::POST, path) => webhook(&state, path, &body).await,
        (_, path) => {
            debug!("Rejecting {} {}", method, path);
            (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response()
        }
    }
}

/// The delivery path must be exactly `/<secret>`.
fn secret_matches(secret: &str, path: &str) -> bool {
    match path.strip_prefix('/') {
        Some(provided) => provided.as_bytes().ct_eq(secret.as_bytes()).into(),
        None => false,
    }
}

async fn webhook(state: &AppState, path: &str, body: &[u8]) -> Response {
    if let Some(secret) = state.config.telegram.webhook_secret() {
        if !secret_matches(secret, path) {
            warn!("Rejected webhook delivery on an unexpected path");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    }

    let span = info_span!("delivery", id = %Uuid::new_v4());
    let outcome = bot::handle_update(state, body).instrument(span.clone()).await;

    match outcome {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            span.in_scope(|| error!("Webhook delivery failed: {:#}", e));
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

async fn setup(state: &AppState) -> Response {
    if let Err(e) = state.config.telegram.bot_token() {
        warn!("Command registration requested without a bot token");
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    match state.messenger.register_commands(COMMANDS).await {
        Ok(result) => {
            info!("Command menu registration result: {}", result);
            Json(result).into_response()
        }
        Err(e) => {
            error!("Command registration failed: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
