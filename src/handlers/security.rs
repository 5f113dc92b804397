//! 管理端安全处理器
//!
//! 全部挂在 stateful 认证 + 管理员门禁之后；
//! 处理器本身只做参数整形，判定逻辑在服务层。

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, Uri},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::auth::request_meta,
    middleware::AppState,
    models::auth::{BanRequest, Principal, ResolveAlertRequest},
    models::security::{SecurityEvent, SecurityEventFilters, SecurityEventPage},
    models::session::{SessionWithUser, TerminationOutcome},
    services::ban_service::BanOutcome,
};

/// 安全日志查询参数（前端用 camelCase）
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub user_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<SecurityEvent>,
}

#[derive(Serialize)]
pub struct ResolveAlertResponse {
    /// false 表示该告警已被处理过（或不存在），操作幂等
    pub resolved: bool,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionWithUser>,
}

/// 安全日志分页查询；limit 超过上限会被服务端截断
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> Result<Json<SecurityEventPage>, AppError> {
    let filters = SecurityEventFilters {
        user_id: query.user_id,
        event_type: query.event_type,
        severity: query.severity,
        start_date: query.start_date,
        end_date: query.end_date,
    };

    let page = state
        .security_service
        .query(&filters, query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await?;

    Ok(Json(page))
}

/// 待处理告警列表
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AlertsResponse>, AppError> {
    let alerts = state.security_service.unresolved_alerts().await?;
    Ok(Json(AlertsResponse { alerts }))
}

/// 处理告警；重复处理同一条返回 resolved=false
pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(req): Json<ResolveAlertRequest>,
) -> Result<Json<ResolveAlertResponse>, AppError> {
    req.validate()?;
    let meta = request_meta(&state, &headers, &method, &uri);

    let resolved = state
        .security_service
        .resolve_alert(req.alert_id, principal.id, req.notes.as_deref(), &meta)
        .await?;

    Ok(Json(ResolveAlertResponse { resolved }))
}

/// 存活会话列表
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<SessionsResponse>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    let sessions = state.session_service.list_active(limit, offset).await?;
    Ok(Json(SessionsResponse { sessions }))
}

/// 终止会话：目标用户在所有设备上同时下线
pub async fn terminate_session(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Json<TerminationOutcome>, AppError> {
    let meta = request_meta(&state, &headers, &method, &uri);

    let outcome = state
        .session_service
        .terminate(session_id, principal.id, "Terminated by administrator", &meta)
        .await?;

    Ok(Json(outcome))
}

/// 封禁用户
pub async fn ban_user(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<BanRequest>,
) -> Result<Json<BanOutcome>, AppError> {
    req.validate()?;

    // 管理员不能封自己，防止把最后一个管理员锁在门外
    if user_id == principal.id {
        return Err(AppError::BadRequest("Cannot ban your own account".to_string()));
    }

    let meta = request_meta(&state, &headers, &method, &uri);
    let outcome = state
        .ban_service
        .ban_user(user_id, &req.reason, &req.duration, principal.id, &meta)
        .await?;

    Ok(Json(outcome))
}

/// 解除封禁
pub async fn unban_user(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let meta = request_meta(&state, &headers, &method, &uri);
    state.ban_service.unban_user(user_id, principal.id, &meta).await?;

    Ok(Json(serde_json::json!({ "userId": user_id, "unbanned": true })))
}
