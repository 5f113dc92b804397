//! 管理端安全 API 集成测试
//!
//! 需要 TEST_DATABASE_URL 指向可用的 PostgreSQL，
//! 使用 `cargo test -- --ignored` 运行。

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::json;
use serial_test::serial;
use tower::ServiceExt;

mod common;
use common::{collect_cookies, create_test_app_state, setup_test_data, setup_test_db, TestData};

async fn login_cookies(
    app: &axum::Router,
    username: &str,
    password: &str,
) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "username": username, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    collect_cookies(&response)
}

async fn admin_cookies(app: &axum::Router, data: &TestData) -> String {
    login_cookies(app, "testadmin", &data.password).await
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_admin_routes_reject_non_admin() {
    let config = common::create_test_config();
    let pool = setup_test_db(&config).await;
    let data = setup_test_data(&pool).await;

    let state = create_test_app_state(pool).await;
    let app = tuning_portal::routes::create_router(state);

    let cookies = login_cookies(&app, &data.username, &data.password).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/security/logs")
                .header(header::COOKIE, &cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_admin_routes_reject_anonymous() {
    let config = common::create_test_config();
    let pool = setup_test_db(&config).await;
    setup_test_data(&pool).await;

    let state = create_test_app_state(pool).await;
    let app = tuning_portal::routes::create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/security/logs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_log_query_limit_is_capped() {
    let config = common::create_test_config();
    let pool = setup_test_db(&config).await;
    let data = setup_test_data(&pool).await;

    let state = create_test_app_state(pool.clone()).await;
    let app = tuning_portal::routes::create_router(state.clone());

    // 写入超过上限的事件
    let meta = tuning_portal::models::security::RequestMeta::internal();
    for _ in 0..120 {
        state
            .security_service
            .record(
                Some(data.user_id),
                tuning_portal::models::security::SecurityEventType::LoginFailure,
                tuning_portal::models::security::Severity::Warning,
                &meta,
                None,
            )
            .await;
    }

    let cookies = admin_cookies(&app, &data).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/security/logs?limit=10000")
                .header(header::COOKIE, &cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    // limit 被钳到 100，total 仍是全量
    assert_eq!(body["logs"].as_array().unwrap().len(), 100);
    assert!(body["total"].as_i64().unwrap() >= 120);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_log_query_severity_filter() {
    let config = common::create_test_config();
    let pool = setup_test_db(&config).await;
    let data = setup_test_data(&pool).await;

    let state = create_test_app_state(pool.clone()).await;
    let app = tuning_portal::routes::create_router(state.clone());

    let meta = tuning_portal::models::security::RequestMeta::internal();
    use tuning_portal::models::security::{SecurityEventType, Severity};
    state
        .security_service
        .record(None, SecurityEventType::LoginSuccess, Severity::Info, &meta, None)
        .await;
    state
        .security_service
        .record(None, SecurityEventType::LoginFailure, Severity::Warning, &meta, None)
        .await;
    state
        .security_service
        .record(None, SecurityEventType::AccountBanned, Severity::Critical, &meta, None)
        .await;

    let cookies = admin_cookies(&app, &data).await;

    // warning 过滤 = warning 及以上
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/security/logs?severity=warning")
                .header(header::COOKIE, &cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    for log in body["logs"].as_array().unwrap() {
        assert_ne!(log["severity"], "info");
    }

    // 无效级别：400
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/security/logs?severity=fatal")
                .header(header::COOKIE, &cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_alert_resolution_is_idempotent() {
    let config = common::create_test_config();
    let pool = setup_test_db(&config).await;
    let data = setup_test_data(&pool).await;

    let state = create_test_app_state(pool.clone()).await;
    let app = tuning_portal::routes::create_router(state.clone());

    // critical 事件直接成为告警
    let meta = tuning_portal::models::security::RequestMeta::internal();
    state
        .security_service
        .record(
            Some(data.user_id),
            tuning_portal::models::security::SecurityEventType::AccountBanned,
            tuning_portal::models::security::Severity::Critical,
            &meta,
            None,
        )
        .await;

    let cookies = admin_cookies(&app, &data).await;

    let alerts = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/security/alerts")
                .header(header::COOKIE, &cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(alerts.status(), StatusCode::OK);

    let bytes = alerts.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let alert_id = body["alerts"][0]["id"].as_str().unwrap().to_string();

    // 第一次处理：resolved=true
    let resolve = |notes: &str| {
        let app = app.clone();
        let cookies = cookies.clone();
        let body = json!({ "alertId": alert_id.as_str(), "notes": notes }).to_string();
        async move {
            app.oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/security/alerts/resolve")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::COOKIE, &cookies)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
        }
    };

    let first = resolve("false positive").await;
    assert_eq!(first.status(), StatusCode::OK);
    let bytes = first.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["resolved"], true);

    // 重复处理：resolved=false，原处理记录不被覆盖
    let second = resolve("should not overwrite").await;
    assert_eq!(second.status(), StatusCode::OK);
    let bytes = second.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["resolved"], false);

    let notes: Option<String> =
        sqlx::query_scalar("SELECT resolution_notes FROM security_events WHERE id = $1::uuid")
            .bind(&alert_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(notes.as_deref(), Some("false positive"));
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_ban_terminates_sessions_and_unban_restores() {
    let config = common::create_test_config();
    let pool = setup_test_db(&config).await;
    let data = setup_test_data(&pool).await;

    let state = create_test_app_state(pool.clone()).await;
    let app = tuning_portal::routes::create_router(state);

    // 目标用户先登录，持有存活会话
    let user_cookies = login_cookies(&app, &data.username, &data.password).await;
    let cookies = admin_cookies(&app, &data).await;

    let ban = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/admin/security/users/{}/ban", data.user_id))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookies)
                .body(Body::from(
                    json!({ "reason": "chargeback abuse", "duration": "7_days" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ban.status(), StatusCode::OK);

    let bytes = ban.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["terminatedSessions"].as_u64().unwrap(), 1);
    assert!(body["banExpiresAt"].is_string());

    // 被封用户的有状态请求立即失效
    let me = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header(header::COOKIE, &user_cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);

    // 解封后可重新登录
    let unban = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/admin/security/users/{}/unban", data.user_id))
                .header(header::COOKIE, &cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unban.status(), StatusCode::OK);

    let relogin = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "username": data.username, "password": data.password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(relogin.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_invalid_ban_duration_rejected() {
    let config = common::create_test_config();
    let pool = setup_test_db(&config).await;
    let data = setup_test_data(&pool).await;

    let state = create_test_app_state(pool).await;
    let app = tuning_portal::routes::create_router(state);

    let cookies = admin_cookies(&app, &data).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/admin/security/users/{}/ban", data.user_id))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookies)
                .body(Body::from(
                    json!({ "reason": "spam", "duration": "forever" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_terminate_session_logs_out_everywhere() {
    let config = common::create_test_config();
    let pool = setup_test_db(&config).await;
    let data = setup_test_data(&pool).await;

    let state = create_test_app_state(pool.clone()).await;
    let app = tuning_portal::routes::create_router(state);

    // 同一用户两次登录：两台设备
    let first = login_cookies(&app, &data.username, &data.password).await;
    let _second = login_cookies(&app, &data.username, &data.password).await;
    let cookies = admin_cookies(&app, &data).await;

    let sessions = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/security/sessions")
                .header(header::COOKIE, &cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(sessions.status(), StatusCode::OK);

    let bytes = sessions.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let target = body["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["username"] == data.username)
        .expect("target session");
    let session_id = target["id"].as_str().unwrap();

    let terminate = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/admin/security/sessions/{}", session_id))
                .header(header::COOKIE, &cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(terminate.status(), StatusCode::OK);

    let bytes = terminate.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    // 删的是该用户的全部会话，不止被点名的那一个
    assert_eq!(body["terminatedSessions"].as_u64().unwrap(), 2);
    assert_eq!(body["userId"].as_str().unwrap(), data.user_id.to_string());

    // 两台设备全部掉线
    let me = app
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header(header::COOKIE, &first)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
}
