//! 固定窗口限流服务
//!
//! 窗口起点按 floor(now / window) * window 截断，计数行持久化在库里。
//! 窗口边界处最多放过 2x limit 的突发，这是固定窗口的既有语义，
//! 保留而非悄悄"修正"。每次判定（放行或拒绝）都镜像进安全日志。

use crate::{
    config::RateLimitConfig,
    error::AppError,
    models::security::{RequestMeta, SecurityEventType, Severity},
    repository::RateLimitRepository,
    services::SecurityService,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;

/// 受限动作标识；只有暴力破解/枚举威胁面上的端点参与限流
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAction {
    Login,
    EmailVerification,
    PasswordReset,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::Login => "login",
            RateLimitAction::EmailVerification => "email_verification",
            RateLimitAction::PasswordReset => "password_reset",
        }
    }
}

/// 限流判定结果
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
    /// 拒绝时距下一窗口的毫秒数；放行时为 0
    pub retry_after_ms: i64,
}

pub struct RateLimitService {
    db: PgPool,
    config: RateLimitConfig,
    security: Arc<SecurityService>,
}

impl RateLimitService {
    pub fn new(db: PgPool, config: RateLimitConfig, security: Arc<SecurityService>) -> Self {
        Self { db, config, security }
    }

    fn limits(&self, action: RateLimitAction) -> (i64, u64) {
        match action {
            RateLimitAction::Login => {
                (self.config.login_limit, self.config.login_window_secs)
            }
            RateLimitAction::EmailVerification => {
                (self.config.verification_limit, self.config.verification_window_secs)
            }
            RateLimitAction::PasswordReset => {
                (self.config.password_reset_limit, self.config.password_reset_window_secs)
            }
        }
    }

    /// 检查并自增；返回判定结果，不抛限流错误
    pub async fn check(
        &self,
        ip: &str,
        action: RateLimitAction,
        meta: &RequestMeta,
    ) -> Result<RateLimitDecision, AppError> {
        let (limit, window_secs) = self.limits(action);
        let window_ms = (window_secs * 1000) as i64;
        let now = Utc::now();

        let window_start_ms = window_start(now.timestamp_millis(), window_ms);
        let window_start = Utc
            .timestamp_millis_opt(window_start_ms)
            .single()
            .ok_or_else(|| AppError::Internal("Invalid window timestamp".to_string()))?;
        let reset_at = Utc
            .timestamp_millis_opt(window_start_ms + window_ms)
            .single()
            .ok_or_else(|| AppError::Internal("Invalid window timestamp".to_string()))?;

        // 原子 upsert-and-increment；限流自身的存储故障按失败关闭处理
        let repo = RateLimitRepository::new(self.db.clone());
        let count = repo.increment(ip, action.as_str(), window_start).await?;

        let allowed = count <= limit;
        let decision = RateLimitDecision {
            allowed,
            limit,
            remaining: (limit - count).max(0),
            reset_at,
            retry_after_ms: if allowed {
                0
            } else {
                (window_start_ms + window_ms - now.timestamp_millis()).max(1)
            },
        };

        // 每次判定都镜像进安全日志，便于监控
        let (event_type, severity) = if allowed {
            (SecurityEventType::RateLimitAllowed, Severity::Info)
        } else {
            metrics::counter!("rate_limit_denied_total", "action" => action.as_str()).increment(1);
            (SecurityEventType::RateLimitDenied, Severity::Warning)
        };
        self.security
            .record(
                None,
                event_type,
                severity,
                meta,
                Some(serde_json::json!({
                    "action": action.as_str(),
                    "count": count,
                    "limit": limit,
                })),
            )
            .await;

        Ok(decision)
    }

    /// 检查并自增；窗口耗尽直接返回 429 错误
    pub async fn enforce(
        &self,
        ip: &str,
        action: RateLimitAction,
        meta: &RequestMeta,
    ) -> Result<RateLimitDecision, AppError> {
        let decision = self.check(ip, action, meta).await?;

        if !decision.allowed {
            tracing::warn!(
                ip = %ip,
                action = action.as_str(),
                retry_after_ms = decision.retry_after_ms,
                "Rate limit exceeded"
            );
            return Err(AppError::RateLimited {
                retry_after_secs: (decision.retry_after_ms as u64).div_ceil(1000),
            });
        }

        Ok(decision)
    }

    /// 清理两个窗口之前的旧计数行
    pub async fn purge_stale(&self) -> Result<u64, AppError> {
        let longest_window = self
            .config
            .login_window_secs
            .max(self.config.verification_window_secs)
            .max(self.config.password_reset_window_secs);

        let cutoff = Utc::now() - chrono::Duration::seconds((longest_window * 2) as i64);
        let repo = RateLimitRepository::new(self.db.clone());
        repo.purge_before(cutoff).await
    }
}

/// 固定窗口起点：floor(now / window) * window
pub fn window_start(now_ms: i64, window_ms: i64) -> i64 {
    (now_ms / window_ms) * window_ms
}
