//! Axum router wiring.
//!
//! The API router serves producers and scrapers; the lifecycle router serves
//! the gateway's own metrics on a separate listener.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{api, app_state::AppState, ops};

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(api::scrape).post(api::push).put(api::push))
        .route("/metrics/", post(api::push).put(api::push))
        .route("/metrics/*labels", post(api::push_labeled).put(api::push_labeled))
        .with_state(state)
}

pub fn build_lifecycle_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
