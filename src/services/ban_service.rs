//! 封禁执行服务
//!
//! 封禁只阻止后续认证并使现有会话失效，不动账户数据与历史。
//! 过期采用软语义：ban_expires_at 过点即视为不生效，标志位不自动清除。

use crate::{
    error::AppError,
    models::security::{RequestMeta, SecurityEventType, Severity},
    models::user::User,
    repository::{SessionRepository, UserRepository},
    services::SecurityService,
};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

// 形如 "7_days"、"12_hours"；"permanent" 单独处理
static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,4})_(hours?|days?|weeks?|months?)$").expect("valid regex"));

/// 封禁操作结果（前端载荷为 camelCase）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BanOutcome {
    pub user_id: Uuid,
    pub ban_expires_at: Option<DateTime<Utc>>,
    pub terminated_sessions: u64,
}

pub struct BanService {
    db: PgPool,
    security: Arc<SecurityService>,
}

impl BanService {
    pub fn new(db: PgPool, security: Arc<SecurityService>) -> Self {
        Self { db, security }
    }

    /// 封禁用户：写封禁字段、删除其全部会话、记录管理员操作
    pub async fn ban_user(
        &self,
        target_user_id: Uuid,
        reason: &str,
        duration: &str,
        banned_by: Uuid,
        meta: &RequestMeta,
    ) -> Result<BanOutcome, AppError> {
        let expires_at = parse_ban_duration(duration)?.map(|d| Utc::now() + d);

        let user_repo = UserRepository::new(self.db.clone());
        let target = user_repo
            .find_by_id(&target_user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        user_repo
            .apply_ban(target.id, reason, expires_at, banned_by)
            .await?;

        // 先写封禁再删会话：期间新建的会话会在下次有状态检查时被封禁复查拦下
        let session_repo = SessionRepository::new(self.db.clone());
        let terminated_sessions = session_repo.delete_all_for_user(target.id).await?;

        tracing::info!(
            target_user = %target.id,
            banned_by = %banned_by,
            duration = duration,
            terminated_sessions,
            "User banned"
        );

        self.security
            .record(
                Some(target.id),
                SecurityEventType::AccountBanned,
                Severity::Critical,
                meta,
                Some(serde_json::json!({
                    "reason": reason,
                    "duration": duration,
                    "banned_by": banned_by,
                    "terminated_sessions": terminated_sessions,
                })),
            )
            .await;
        self.security
            .record(
                Some(banned_by),
                SecurityEventType::AdminAction,
                Severity::Warning,
                meta,
                Some(serde_json::json!({ "action": "ban_user", "target": target.id })),
            )
            .await;

        Ok(BanOutcome {
            user_id: target.id,
            ban_expires_at: expires_at,
            terminated_sessions,
        })
    }

    /// 解除封禁；下一次认证立即生效，无需额外传播
    pub async fn unban_user(
        &self,
        target_user_id: Uuid,
        unbanned_by: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), AppError> {
        let user_repo = UserRepository::new(self.db.clone());
        let cleared = user_repo.clear_ban(target_user_id).await?;

        if !cleared {
            return Err(AppError::NotFound);
        }

        self.security
            .record(
                Some(target_user_id),
                SecurityEventType::AccountUnbanned,
                Severity::Info,
                meta,
                Some(serde_json::json!({ "unbanned_by": unbanned_by })),
            )
            .await;

        Ok(())
    }

    /// 每次认证重新评估封禁状态，不做缓存
    ///
    /// 用户行缺失按失败关闭处理（拒绝），绝不默认放行
    pub async fn ensure_not_banned(&self, user_id: Uuid) -> Result<(), AppError> {
        let user_repo = UserRepository::new(self.db.clone());
        let user = user_repo
            .find_by_id(&user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        check_ban(&user)
    }
}

/// 纯检查：is_banned 且（无过期或未到期）才算生效
pub fn check_ban(user: &User) -> Result<(), AppError> {
    if !user.is_banned {
        return Ok(());
    }

    match user.ban_expires_at {
        // 软过期：已过点即放行，标志位留在原地
        Some(expires_at) if expires_at <= Utc::now() => Ok(()),
        expires_at => Err(AppError::Banned {
            reason: user
                .ban_reason
                .clone()
                .unwrap_or_else(|| "No reason given".to_string()),
            expires_at,
        }),
    }
}

/// 解析封禁时长："permanent" 为 None，"<n>_<unit>" 为对应时长
pub fn parse_ban_duration(token: &str) -> Result<Option<Duration>, AppError> {
    if token == "permanent" {
        return Ok(None);
    }

    let captures = DURATION_RE
        .captures(token)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid ban duration: {}", token)))?;

    let amount: i64 = captures[1]
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid ban duration: {}", token)))?;
    if amount == 0 {
        return Err(AppError::BadRequest("Ban duration must be positive".to_string()));
    }

    let duration = match &captures[2] {
        u if u.starts_with("hour") => Duration::hours(amount),
        u if u.starts_with("day") => Duration::days(amount),
        u if u.starts_with("week") => Duration::weeks(amount),
        // 月按 30 天折算
        u if u.starts_with("month") => Duration::days(amount * 30),
        _ => unreachable!("regex restricts units"),
    };

    Ok(Some(duration))
}
