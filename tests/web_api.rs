//! API behavior against an engine with no serial device attached.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use beamdrive::config::Config;
use beamdrive::engine::Engine;
use beamdrive::web::api;

fn router() -> axum::Router {
    api::create_router(Arc::new(Engine::new(Arc::new(Config::default()))))
}

fn json_post(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

#[tokio::test]
async fn status_reports_disconnected() {
    let response = router()
        .oneshot(Request::get("/api/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["serial_connected"], false);
    assert_eq!(status["ready"], false);
    assert_eq!(status["app_version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(status["position"], serde_json::json!([0.0, 0.0, 0.0]));
}

#[tokio::test]
async fn job_submission_requires_a_connection() {
    let job = serde_json::json!({
        "head": {},
        "passes": [{"items": [0], "intensity": 50.0}],
        "items": [{"def": 0}],
        "defs": [{"kind": "path", "data": [[[0.0, 0.0], [10.0, 10.0]]]}],
    });
    let response = router()
        .oneshot(json_post("/api/v1/job", &job.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["error"], "not connected");
}

#[tokio::test]
async fn connect_without_a_port_is_rejected() {
    let response = router()
        .oneshot(
            Request::post("/api/v1/connect")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn control_endpoints_accept_while_disconnected() {
    for uri in ["/api/v1/pause", "/api/v1/unpause", "/api/v1/stop"] {
        let response = router()
            .oneshot(Request::post(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "endpoint {uri}");
    }
}

#[tokio::test]
async fn move_endpoint_accepts_partial_axes() {
    let response = router()
        .oneshot(json_post("/api/v1/move", r#"{"x": 10.0}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn disconnect_when_not_connected_conflicts() {
    let response = router()
        .oneshot(
            Request::post("/api/v1/disconnect")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
