#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use pushprism_gateway::app_state::AppState;
use pushprism_gateway::{config, router};

const PAYLOAD: &str = "# TYPE some_counter counter\nsome_counter 1\n";

fn state() -> AppState {
    AppState::new(&config::load_from_str("version: 1\n").unwrap())
}

async fn send(app: Router, method: Method, uri: &str, body: &'static str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn push_paths_attach_identity_labels() {
    let cases = [
        ("/metrics/label1/value1/label2/value2", "{label1=\"value1\",label2=\"value2\"}"),
        ("/metrics/job/someJob", "{job=\"someJob\"}"),
        ("/metrics", ""),
        ("/metrics/", ""),
    ];

    for (path, labels) in cases {
        let state = state();
        let api = router::build_api_router(state.clone());

        let (status, _) = send(api.clone(), Method::PUT, path, PAYLOAD).await;
        assert_eq!(status, StatusCode::ACCEPTED, "{path}");

        state.aggregates().swap();
        let (status, body) = send(api, Method::GET, "/metrics", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            format!("# TYPE some_counter counter\nsome_counter{labels} 1\n"),
            "{path}"
        );
    }
}

#[tokio::test]
async fn post_is_accepted_like_put() {
    let api = router::build_api_router(state());
    let (status, _) = send(api, Method::POST, "/metrics/job/x", PAYLOAD).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn repeated_identity_name_is_rejected() {
    let api = router::build_api_router(state());
    let path = "/metrics/testing/one/testing/two/testing/three";
    let (status, body) = send(api, Method::PUT, path, PAYLOAD).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("duplicate label testing"), "{body}");
}

#[tokio::test]
async fn lifecycle_router_serves_self_metrics_only() {
    let state = state();
    let lifecycle = router::build_lifecycle_router(state.clone());

    let (status, body) = send(lifecycle.clone(), Method::GET, "/metrics", "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("# TYPE pushprism_pushes_total counter"), "{body}");

    let (status, _) = send(lifecycle, Method::PUT, "/metrics", PAYLOAD).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
