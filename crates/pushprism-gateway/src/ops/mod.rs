//! Lifecycle endpoints.
//!
//! - `/metrics` : gateway self-metrics, Prometheus text format

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::app_state::AppState;

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, prometheus_text())],
        body,
    )
        .into_response()
}

fn prometheus_text() -> &'static str {
    pushprism_core::Format::Text.content_type()
}
