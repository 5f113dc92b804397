//! 认证处理器
//!
//! 凭据经 Set-Cookie 下发（auth_token + session_id），响应体不含令牌本体。

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use crate::{
    auth::cookies::{self, AUTH_COOKIE, SESSION_COOKIE},
    auth::middleware::VerifiedClaims,
    error::AppError,
    middleware::{client_ip, AppState},
    models::auth::{
        LoginRequest, LoginResponse, PasswordResetRequest, Principal, VerifyEmailRequest,
    },
    models::security::RequestMeta,
    models::user::UserResponse,
    services::auth_service::IssuedCredentials,
};

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub refreshed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

#[derive(Serialize)]
pub struct TerminationNoticeResponse {
    pub terminated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// 用户登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    req.validate()?;
    let meta = request_meta(&state, &headers, &method, &uri);

    let credentials = state.auth_service.login(req, &meta).await?;
    credentials_response(&state, credentials)
}

/// 用户登出：删当前会话行并让两个 Cookie 立即过期
///
/// 无论会话是否还存在都返回成功
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(session_token) = cookies::cookie_value(&headers, SESSION_COOKIE) {
        state.session_service.logout(&session_token).await?;
    }

    let secure = state.config.security.secure_cookies;
    let mut response = Json(MessageResponse {
        message: "Logged out".to_string(),
    })
    .into_response();
    append_cookie(&mut response, &cookies::expired_cookie(AUTH_COOKIE, secure))?;
    append_cookie(&mut response, &cookies::expired_cookie(SESSION_COOKIE, secure))?;

    Ok(response)
}

/// 令牌续签：临近过期才换新，否则原样放行
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Extension(VerifiedClaims(claims)): Extension<VerifiedClaims>,
) -> Result<Response, AppError> {
    match state.auth_service.refresh(&principal, &claims)? {
        Some(token) => {
            let expires_in = state.config.security.token_exp_secs;
            let mut response = Json(RefreshResponse {
                refreshed: true,
                expires_in: Some(expires_in),
            })
            .into_response();
            append_cookie(
                &mut response,
                &cookies::auth_cookie(&token, expires_in, state.config.security.secure_cookies),
            )?;
            Ok(response)
        }
        None => Ok(Json(RefreshResponse {
            refreshed: false,
            expires_in: None,
        })
        .into_response()),
    }
}

/// 当前用户信息（有状态路径：会话与封禁均已在中间件复查）
pub async fn me(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.auth_service.current_user(&principal).await?;
    Ok(Json(user))
}

/// 会话被管理员终止后的说明；没有终止记录时 terminated=false
pub async fn termination_notice(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<TerminationNoticeResponse>, AppError> {
    let notice = state.session_service.termination_notice(principal.id).await?;

    Ok(Json(TerminationNoticeResponse {
        terminated: notice.is_some(),
        notice,
    }))
}

/// 密码重置请求；响应刻意与账户是否存在无关
pub async fn password_reset(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;
    let meta = request_meta(&state, &headers, &method, &uri);

    state.auth_service.request_password_reset(req, &meta).await?;

    Ok(Json(MessageResponse {
        message: "If the account exists, a reset link has been sent".to_string(),
    }))
}

/// 邮箱验证令牌兑换；成功即视为登录
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Response, AppError> {
    req.validate()?;
    let meta = request_meta(&state, &headers, &method, &uri);

    let credentials = state.auth_service.verify_email(req, &meta).await?;
    credentials_response(&state, credentials)
}

/// 从请求部件组装事件元数据
pub fn request_meta(
    state: &AppState,
    headers: &HeaderMap,
    method: &Method,
    uri: &Uri,
) -> RequestMeta {
    RequestMeta {
        source_ip: client_ip(headers, state.config.security.trust_proxy),
        path: uri.path().to_string(),
        method: method.to_string(),
    }
}

/// 凭据响应：响应体为用户信息，令牌走两条 Set-Cookie
fn credentials_response(
    state: &AppState,
    credentials: IssuedCredentials,
) -> Result<Response, AppError> {
    let secure = state.config.security.secure_cookies;
    let body = LoginResponse::from(&credentials);

    let mut response = (StatusCode::OK, Json(body)).into_response();
    append_cookie(
        &mut response,
        &cookies::auth_cookie(&credentials.token, state.config.security.token_exp_secs, secure),
    )?;
    append_cookie(
        &mut response,
        &cookies::session_cookie(
            &credentials.session_token,
            state.config.security.session_ttl_secs,
            secure,
        ),
    )?;

    Ok(response)
}

fn append_cookie(response: &mut Response, cookie: &str) -> Result<(), AppError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| AppError::Internal(format!("Invalid cookie header: {}", e)))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}
