//! 路由定义
//!
//! 路由按认证策略分组：
//! - public：无认证
//! - stateless：只验签名令牌（无 I/O）
//! - stateful：令牌 + 会话存活 + 封禁复查
//! - admin：stateful 之上再加管理员门禁

use axum::{
    http::{header, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
};

use crate::{
    auth::middleware::{authenticate, authenticate_stateful, require_admin},
    handlers::{auth, health, metrics, security},
    middleware::AppState,
};

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(metrics::metrics_export))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/password-reset", post(auth::password_reset))
        .route("/auth/verify-email", post(auth::verify_email));

    // 高频、容忍令牌有效期内延迟吊销的路径
    let stateless_routes = Router::new()
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/termination", get(auth::termination_notice))
        .layer(from_fn_with_state(state.clone(), authenticate));

    // 需要即时吊销语义的路径；/auth/user 为兼容别名
    let stateful_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/user", get(auth::me))
        .layer(from_fn_with_state(state.clone(), authenticate_stateful));

    // 管理端；layer 后添加者先执行，认证层必须在门禁层之后挂
    let admin_routes = Router::new()
        .route("/admin/security/logs", get(security::list_logs))
        .route("/admin/security/alerts", get(security::list_alerts))
        .route("/admin/security/alerts/resolve", post(security::resolve_alert))
        .route("/admin/security/sessions", get(security::list_sessions))
        .route("/admin/security/sessions/{id}", delete(security::terminate_session))
        .route("/admin/security/users/{id}/ban", post(security::ban_user))
        .route("/admin/security/users/{id}/unban", post(security::unban_user))
        .layer(from_fn_with_state(state.clone(), require_admin))
        .layer(from_fn_with_state(state.clone(), authenticate_stateful));

    // Cookie 认证要求 allow_credentials，因此 origin 不能用通配符
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(public_routes)
        .merge(stateless_routes)
        .merge(stateful_routes)
        .merge(admin_routes)
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(cors)
        .layer(axum::middleware::from_fn(
            crate::middleware::request_tracking_middleware,
        ))
        .with_state(state)
}
