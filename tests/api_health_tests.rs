//! 健康检查 API 集成测试

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serial_test::serial;
use tower::ServiceExt;

mod common;
use common::{create_test_app_state, setup_test_db};

#[tokio::test]
async fn test_health_check_handler() {
    let response = tuning_portal::handlers::health::health_check().await;
    assert_eq!(response.0.status, "ok");
    assert_eq!(response.0.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_readiness_reports_database() {
    let config = common::create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(pool).await;
    let app = tuning_portal::routes::create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ready"], true);
    assert_eq!(body["checks"][0]["name"], "database");
}
