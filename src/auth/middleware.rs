//! 认证中间件（组合点）
//!
//! 每个请求的状态机：提取令牌 → 验签 →（有状态策略时：会话存活 → 封禁复查）→ 放行。
//! 任何一步失败立即短路为 401/403；门禁检查出错绝不默认放行。
//!
//! 路由按命名策略二选一：
//! - Stateless：只验签名令牌，无 I/O，用于高频读路径
//! - Stateful：额外确认会话行存活并复查封禁，用于需要即时吊销的路径

use crate::{
    auth::cookies::{self, AUTH_COOKIE, SESSION_COOKIE},
    error::AppError,
    middleware::{client_ip, AppState},
    models::auth::Principal,
    models::security::{RequestMeta, SecurityEventType, Severity},
    models::user::Role,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// 已校验的令牌声明，stateless 层写入扩展供 refresh 处理器读取
#[derive(Debug, Clone)]
pub struct VerifiedClaims(pub crate::auth::token::Claims);

// 实现 FromRequestParts 以便在 handler 中直接提取 Principal
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 提取签名令牌：优先 auth_token Cookie，回退 Authorization: Bearer
pub fn extract_token(headers: &HeaderMap) -> Result<String, AppError> {
    if let Some(token) = cookies::cookie_value(headers, AUTH_COOKIE) {
        return Ok(token);
    }

    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").map(|t| t.to_string()))
        .ok_or(AppError::Unauthorized)
}

/// Stateless 认证：验签令牌并注入 Principal，不触库
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())?;
    let claims = state.token_service.verify(&token)?;
    let principal = claims.principal()?;

    req.extensions_mut().insert(principal);
    req.extensions_mut().insert(VerifiedClaims(claims));

    Ok(next.run(req).await)
}

/// Stateful 认证：令牌验签 + 会话存活确认 + 封禁复查
///
/// 会话行缺失即 401 session_terminated——这是管理员终止/封禁
/// 在客户端被观察到的途径（拉取式，而非推送）。
pub async fn authenticate_stateful(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())?;
    let claims = state.token_service.verify(&token)?;
    let principal = claims.principal()?;

    // 会话存活检查：Cookie 缺失与行缺失同样视为已终止
    let session_token = cookies::cookie_value(req.headers(), SESSION_COOKIE)
        .ok_or(AppError::SessionExpired)?;
    let session = state.session_service.verify(&session_token).await?;

    if session.user_id != principal.id {
        tracing::warn!(
            session_user = %session.user_id,
            token_user = %principal.id,
            "Session/token principal mismatch"
        );
        return Err(AppError::Unauthorized);
    }

    // 封禁复查：不依赖封禁时已删除会话的前置动作，作为纵深防御
    // 每次认证都重新评估，解除封禁无需任何传播步骤即可生效
    state.ban_service.ensure_not_banned(principal.id).await?;

    req.extensions_mut().insert(principal);
    req.extensions_mut().insert(VerifiedClaims(claims));

    Ok(next.run(req).await)
}

/// 管理员门禁：非 admin 一律 403，并把越权尝试记入安全日志
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or(AppError::Unauthorized)?;

    let meta = RequestMeta {
        source_ip: client_ip(req.headers(), state.config.security.trust_proxy),
        path: req.uri().path().to_string(),
        method: req.method().to_string(),
    };

    if principal.role != Role::Admin {
        metrics::counter!("auth_failures_total", "kind" => "forbidden").increment(1);
        state
            .security_service
            .record(
                Some(principal.id),
                SecurityEventType::UnauthorizedAccess,
                Severity::Warning,
                &meta,
                Some(serde_json::json!({ "username": principal.username })),
            )
            .await;
        return Err(AppError::Forbidden);
    }

    // 管理端访问本身也是安全相关事实，成功与否都留痕
    state
        .security_service
        .record(
            Some(principal.id),
            SecurityEventType::AdminAction,
            Severity::Info,
            &meta,
            Some(serde_json::json!({ "username": principal.username, "access": "granted" })),
        )
        .await;

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", "auth_token=cookie_token".parse().unwrap());

        assert_eq!(extract_token(&headers).unwrap(), "cookie_token");
    }

    #[test]
    fn test_extract_token_bearer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer header_token".parse().unwrap());

        assert_eq!(extract_token(&headers).unwrap(), "header_token");
    }

    #[test]
    fn test_cookie_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", "auth_token=cookie_token".parse().unwrap());
        headers.insert("authorization", "Bearer header_token".parse().unwrap());

        assert_eq!(extract_token(&headers).unwrap(), "cookie_token");
    }

    #[test]
    fn test_extract_token_missing() {
        let headers = HeaderMap::new();
        assert!(extract_token(&headers).is_err());
    }

    #[test]
    fn test_extract_token_invalid_format() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "InvalidFormat".parse().unwrap());

        assert!(extract_token(&headers).is_err());
    }
}
