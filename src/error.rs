//! 统一错误模型
//! 定义所有错误类型和错误响应格式
//!
//! 门禁类错误（认证/封禁/限流）必须短路请求，绝不吞掉；
//! 返回给客户端的消息刻意保持笼统，细节只进服务端日志。

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed")]
    Unauthorized,

    #[error("Session terminated or expired")]
    SessionExpired,

    #[error("Access denied")]
    Forbidden,

    #[error("Account banned: {reason}")]
    Banned {
        reason: String,
        expires_at: Option<DateTime<Utc>>,
    },

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Resource not found")]
    NotFound,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::SessionExpired => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::Banned { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 机器可读错误码，客户端据此触发强制登出等行为
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::SessionExpired => "session_terminated",
            AppError::Forbidden => "forbidden",
            AppError::Banned { .. } => "account_banned",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::NotFound => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Database(_) => "database_error",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthorized => "Authentication failed".to_string(),
            AppError::SessionExpired => "Your session has been terminated".to_string(),
            AppError::Forbidden => "Access denied".to_string(),
            AppError::Banned { reason, .. } => format!("Account banned: {}", reason),
            AppError::RateLimited { .. } => "Too many requests, try again later".to_string(),
            AppError::NotFound => "Resource not found".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }
}

/// 错误响应 DTO
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub error_code: &'static str,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        let (ban_expires_at, retry_after_secs) = match &self {
            AppError::Banned { expires_at, .. } => (*expires_at, None),
            AppError::RateLimited { retry_after_secs } => (None, Some(*retry_after_secs)),
            _ => (None, None),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                error_code: self.error_code(),
                message: self.user_message(),
                request_id,
                ban_expires_at,
                retry_after_secs,
            },
        };

        // 记录错误日志
        tracing::error!(
            code = self.code(),
            error_code = self.error_code(),
            message = %self,
            request_id = %error_response.error.request_id,
            "Application error"
        );

        let mut response = (status, Json(error_response)).into_response();

        // 429 响应附带 Retry-After 头（秒）
        if let Some(secs) = retry_after_secs {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// 从 String 转换为 AppError::Config
impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Config(s)
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

/// 请求体验证失败统一映射为 400
impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Unauthorized.code(), 401);
        assert_eq!(AppError::SessionExpired.code(), 401);
        assert_eq!(AppError::Forbidden.code(), 403);
        assert_eq!(
            AppError::Banned { reason: "spam".to_string(), expires_at: None }.code(),
            403
        );
        assert_eq!(AppError::NotFound.code(), 404);
        assert_eq!(AppError::BadRequest("test".to_string()).code(), 400);
        assert_eq!(AppError::RateLimited { retry_after_secs: 30 }.code(), 429);
    }

    #[test]
    fn test_session_expired_carries_termination_code() {
        // 客户端依赖该错误码执行强制登出
        assert_eq!(AppError::SessionExpired.error_code(), "session_terminated");
    }

    #[test]
    fn test_user_message_no_sensitive_info() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        let message = error.user_message();
        assert_eq!(message, "Database error occurred");
        assert!(!message.contains("sqlx"));
    }

    #[test]
    fn test_rate_limited_response_has_retry_after_header() {
        let response = AppError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "42"
        );
    }
}
