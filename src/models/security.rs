//! 安全事件、告警与限流模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 安全事件类型
///
/// 开放枚举：库里按字符串存储，未知类型原样保留，
/// 已知常量集中在这里避免散落的裸字符串
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailure,
    UnauthorizedAccess,
    SessionInvalidated,
    AccountBanned,
    AccountUnbanned,
    AdminAction,
    RateLimitAllowed,
    RateLimitDenied,
    PasswordResetRequest,
    VerificationAttempt,
    AlertResolved,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::LoginSuccess => "login_success",
            SecurityEventType::LoginFailure => "login_failure",
            SecurityEventType::UnauthorizedAccess => "unauthorized_access",
            SecurityEventType::SessionInvalidated => "session_invalidated",
            SecurityEventType::AccountBanned => "account_banned",
            SecurityEventType::AccountUnbanned => "account_unbanned",
            SecurityEventType::AdminAction => "admin_action",
            SecurityEventType::RateLimitAllowed => "rate_limit_allowed",
            SecurityEventType::RateLimitDenied => "rate_limit_denied",
            SecurityEventType::PasswordResetRequest => "password_reset_request",
            SecurityEventType::VerificationAttempt => "verification_attempt",
            SecurityEventType::AlertResolved => "alert_resolved",
        }
    }
}

/// 严重级别：封闭有序枚举，info < warning < critical
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// 给定级别及以上的字符串集合，用于 SQL IN 过滤
    pub fn at_or_above(&self) -> &'static [&'static str] {
        match self {
            Severity::Info => &["info", "warning", "critical"],
            Severity::Warning => &["warning", "critical"],
            Severity::Critical => &["critical"],
        }
    }
}

/// 安全事件行（追加写）
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub severity: String,
    pub source_ip: String,
    pub path: String,
    pub method: String,
    pub details: Option<serde_json::Value>,

    // 告警处置字段；只有被提升为告警的事件才会被置位
    pub resolved: bool,
    pub resolved_by: Option<Uuid>,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// 事件写入参数
#[derive(Debug, Clone)]
pub struct NewSecurityEvent<'a> {
    pub user_id: Option<Uuid>,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub source_ip: &'a str,
    pub path: &'a str,
    pub method: &'a str,
    pub details: Option<serde_json::Value>,
}

/// 安全日志查询过滤器
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityEventFilters {
    pub user_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// 分页查询结果
#[derive(Debug, Serialize)]
pub struct SecurityEventPage {
    pub logs: Vec<SecurityEvent>,
    pub total: i64,
}

/// 请求元数据，随事件一并落库
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub source_ip: String,
    pub path: String,
    pub method: String,
}

impl RequestMeta {
    pub fn internal() -> Self {
        Self {
            source_ip: "internal".to_string(),
            path: String::new(),
            method: String::new(),
        }
    }
}
