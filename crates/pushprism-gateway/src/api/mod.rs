//! Push and scrape endpoints.
//!
//! - `POST|PUT /metrics[/*labels]` : merge a text exposition payload; path
//!   segments are `key/value` identity labels
//! - `GET /metrics` : render the read side, format picked from `Accept`

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::json;

use pushprism_core::error::{ClientCode, PushPrismError};
use pushprism_core::{Format, IdentityLabels};

use crate::app_state::AppState;

pub async fn push(State(state): State<AppState>, body: Bytes) -> Response {
    ingest(&state, "", &body)
}

pub async fn push_labeled(
    State(state): State<AppState>,
    Path(labels): Path<String>,
    body: Bytes,
) -> Response {
    ingest(&state, &labels, &body)
}

fn ingest(state: &AppState, path: &str, body: &[u8]) -> Response {
    let res = IdentityLabels::from_path(path)
        .and_then(|identity| state.aggregates().ingest(body, &identity));

    match res {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            state.metrics().record_ingest_error(e.kind());
            tracing::warn!(kind = e.kind(), labels = %path, error = %e, "push rejected");
            error_response(&e)
        }
    }
}

pub async fn scrape(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let format = Format::negotiate(accept);

    let mut body = Vec::new();
    match state.aggregates().render(&mut body, format) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, format.content_type())],
            body,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_json(code: &str, msg: &str) -> String {
    json!({
        "code": code,
        "message": msg,
    })
    .to_string()
}

/// JSON error body with the stable client code.
pub fn error_response(err: &PushPrismError) -> Response {
    let code = err.client_code();
    let status = match code {
        ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ClientCode::BadRequest | ClientCode::BadConfig => StatusCode::BAD_REQUEST,
    };
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        error_json(code.as_str(), &err.to_string()),
    )
        .into_response()
}
