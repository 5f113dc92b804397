//! 安全事件日志与告警服务
//!
//! 写路径 fire-and-forget：日志落库失败只进运行日志，绝不影响父请求。
//! 读路径供管理端安全面板使用，分页上限由服务端强制。

use crate::{
    error::AppError,
    models::security::{
        NewSecurityEvent, RequestMeta, SecurityEvent, SecurityEventFilters, SecurityEventPage,
        SecurityEventType, Severity,
    },
    repository::SecurityRepository,
};
use sqlx::PgPool;
use uuid::Uuid;

/// 服务端强制的分页上限，客户端请求再大也截到这里
pub const MAX_PAGE_LIMIT: i64 = 100;

pub struct SecurityService {
    db: PgPool,
    failed_login_threshold: i64,
    failed_login_window_secs: u64,
}

impl SecurityService {
    pub fn new(db: PgPool, failed_login_threshold: i64, failed_login_window_secs: u64) -> Self {
        Self {
            db,
            failed_login_threshold,
            failed_login_window_secs,
        }
    }

    /// 记录安全事件；失败被吞掉并记入运行日志
    pub async fn record(
        &self,
        user_id: Option<Uuid>,
        event_type: SecurityEventType,
        severity: Severity,
        meta: &RequestMeta,
        details: Option<serde_json::Value>,
    ) {
        let new_event = NewSecurityEvent {
            user_id,
            event_type,
            severity,
            source_ip: &meta.source_ip,
            path: &meta.path,
            method: &meta.method,
            details,
        };

        if let Err(e) = self.try_record(&new_event).await {
            // 日志写入失败不传播给调用方
            metrics::counter!("security_event_write_failures_total").increment(1);
            tracing::warn!(
                event_type = new_event.event_type.as_str(),
                error = %e,
                "Failed to record security event"
            );
        }
    }

    async fn try_record(&self, new_event: &NewSecurityEvent<'_>) -> Result<(), AppError> {
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            user_id: new_event.user_id,
            event_type: new_event.event_type.as_str().to_string(),
            severity: new_event.severity.as_str().to_string(),
            source_ip: new_event.source_ip.to_string(),
            path: new_event.path.to_string(),
            method: new_event.method.to_string(),
            details: new_event.details.clone(),
            resolved: false,
            resolved_by: None,
            resolution_notes: None,
            resolved_at: None,
            created_at: chrono::Utc::now(),
        };

        metrics::counter!("security_events_total", "severity" => new_event.severity.as_str())
            .increment(1);

        let repo = SecurityRepository::new(self.db.clone());
        repo.insert_event(&event).await
    }

    /// 查询安全日志；limit 被钳制在 [1, MAX_PAGE_LIMIT]
    pub async fn query(
        &self,
        filters: &SecurityEventFilters,
        limit: i64,
        offset: i64,
    ) -> Result<SecurityEventPage, AppError> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let offset = offset.max(0);

        // severity 过滤按 "给定级别及以上" 语义
        let severities = match &filters.severity {
            Some(s) => Some(
                Severity::parse(s)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown severity: {}", s)))?
                    .at_or_above(),
            ),
            None => None,
        };

        let repo = SecurityRepository::new(self.db.clone());
        let logs = repo.query_events(filters, severities, limit, offset).await?;
        let total = repo.count_events(filters, severities).await?;

        Ok(SecurityEventPage { logs, total })
    }

    /// 待处理告警（派生自近期事件）
    pub async fn unresolved_alerts(&self) -> Result<Vec<SecurityEvent>, AppError> {
        let repo = SecurityRepository::new(self.db.clone());
        repo.list_unresolved_alerts(
            self.failed_login_threshold,
            self.failed_login_window_secs as f64,
            MAX_PAGE_LIMIT,
        )
        .await
    }

    /// 处理告警；处理动作本身作为管理员操作留痕
    pub async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolved_by: Uuid,
        notes: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<bool, AppError> {
        let repo = SecurityRepository::new(self.db.clone());
        let resolved = repo.resolve_event(alert_id, resolved_by, notes).await?;

        if resolved {
            self.record(
                Some(resolved_by),
                SecurityEventType::AlertResolved,
                Severity::Info,
                meta,
                Some(serde_json::json!({ "alert_id": alert_id })),
            )
            .await;
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_limit_constant() {
        assert_eq!(MAX_PAGE_LIMIT, 100);
    }

    #[test]
    fn test_limit_clamp_math() {
        assert_eq!(200i64.clamp(1, MAX_PAGE_LIMIT), 100);
        assert_eq!(0i64.clamp(1, MAX_PAGE_LIMIT), 1);
        assert_eq!(50i64.clamp(1, MAX_PAGE_LIMIT), 50);
    }
}
