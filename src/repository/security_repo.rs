//! Security event repository (安全事件数据访问)

use crate::{
    error::AppError,
    models::security::{SecurityEvent, SecurityEventFilters},
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct SecurityRepository {
    db: PgPool,
}

impl SecurityRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 插入安全事件（追加写）
    pub async fn insert_event(&self, event: &SecurityEvent) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO security_events (
                id, user_id, event_type, severity, source_ip, path, method, details,
                resolved, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(&event.event_type)
        .bind(&event.severity)
        .bind(&event.source_ip)
        .bind(&event.path)
        .bind(&event.method)
        .bind(&event.details)
        .bind(event.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 查询安全事件
    pub async fn query_events(
        &self,
        filters: &SecurityEventFilters,
        severities: Option<&[&str]>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SecurityEvent>, AppError> {
        let (clause, index) = Self::filter_clause(filters, severities);
        let query = format!(
            "SELECT * FROM security_events WHERE 1=1{} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            clause,
            index + 1,
            index + 2
        );

        let mut query_builder = sqlx::query_as::<_, SecurityEvent>(&query);
        query_builder = Self::bind_filters(query_builder, filters, severities);

        let events = query_builder
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

        Ok(events)
    }

    /// 统计安全事件数量
    pub async fn count_events(
        &self,
        filters: &SecurityEventFilters,
        severities: Option<&[&str]>,
    ) -> Result<i64, AppError> {
        let (clause, _) = Self::filter_clause(filters, severities);
        let query = format!("SELECT COUNT(*) FROM security_events WHERE 1=1{}", clause);

        let mut query_builder = sqlx::query(&query);
        query_builder = Self::bind_filters_scalar(query_builder, filters, severities);

        let count: i64 = query_builder.fetch_one(&self.db).await?.get(0);
        Ok(count)
    }

    /// 待处理告警：派生查询而非独立写路径
    ///
    /// 事件符合任一条件即提升为告警：
    /// 1. severity = critical
    /// 2. 同一来源 IP 在短窗口内的失败登录达到阈值
    pub async fn list_unresolved_alerts(
        &self,
        failed_login_threshold: i64,
        failed_login_window_secs: f64,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, AppError> {
        let events = sqlx::query_as::<_, SecurityEvent>(
            r#"
            SELECT e.* FROM security_events e
            WHERE e.resolved = FALSE
              AND (
                e.severity = 'critical'
                OR (
                  e.event_type = 'login_failure'
                  AND e.created_at > NOW() - make_interval(secs => $1)
                  AND (
                    SELECT COUNT(*) FROM security_events f
                    WHERE f.event_type = 'login_failure'
                      AND f.source_ip = e.source_ip
                      AND f.created_at > NOW() - make_interval(secs => $1)
                  ) >= $2
                )
              )
            ORDER BY e.created_at DESC
            LIMIT $3
            "#,
        )
        .bind(failed_login_window_secs)
        .bind(failed_login_threshold)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(events)
    }

    /// 将告警标记为已处理
    ///
    /// 单条 UPDATE 以 `NOT resolved` 守护：不存在或已处理都返回 false，
    /// 不会产生重复处置记录
    pub async fn resolve_event(
        &self,
        event_id: Uuid,
        resolved_by: Uuid,
        notes: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE security_events
            SET
                resolved = TRUE,
                resolved_by = $2,
                resolution_notes = $3,
                resolved_at = NOW()
            WHERE id = $1 AND resolved = FALSE
            "#,
        )
        .bind(event_id)
        .bind(resolved_by)
        .bind(notes)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // 动态过滤子句；返回 (片段, 已占用的绑定序号)
    fn filter_clause(
        filters: &SecurityEventFilters,
        severities: Option<&[&str]>,
    ) -> (String, usize) {
        let mut clause = String::new();
        let mut index = 0;

        if filters.user_id.is_some() {
            index += 1;
            clause.push_str(&format!(" AND user_id = ${}", index));
        }
        if filters.event_type.is_some() {
            index += 1;
            clause.push_str(&format!(" AND event_type = ${}", index));
        }
        if severities.is_some() {
            index += 1;
            clause.push_str(&format!(" AND severity = ANY(${})", index));
        }
        if filters.start_date.is_some() {
            index += 1;
            clause.push_str(&format!(" AND created_at >= ${}", index));
        }
        if filters.end_date.is_some() {
            index += 1;
            clause.push_str(&format!(" AND created_at <= ${}", index));
        }

        (clause, index)
    }

    fn bind_filters<'q>(
        mut query_builder: sqlx::query::QueryAs<'q, sqlx::Postgres, SecurityEvent, sqlx::postgres::PgArguments>,
        filters: &'q SecurityEventFilters,
        severities: Option<&[&str]>,
    ) -> sqlx::query::QueryAs<'q, sqlx::Postgres, SecurityEvent, sqlx::postgres::PgArguments> {
        if let Some(user_id) = filters.user_id {
            query_builder = query_builder.bind(user_id);
        }
        if let Some(event_type) = &filters.event_type {
            query_builder = query_builder.bind(event_type);
        }
        if let Some(severities) = severities {
            let owned: Vec<String> = severities.iter().map(|s| s.to_string()).collect();
            query_builder = query_builder.bind(owned);
        }
        if let Some(start_date) = filters.start_date {
            query_builder = query_builder.bind(start_date);
        }
        if let Some(end_date) = filters.end_date {
            query_builder = query_builder.bind(end_date);
        }

        query_builder
    }

    fn bind_filters_scalar<'q>(
        mut query_builder: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        filters: &'q SecurityEventFilters,
        severities: Option<&[&str]>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        if let Some(user_id) = filters.user_id {
            query_builder = query_builder.bind(user_id);
        }
        if let Some(event_type) = &filters.event_type {
            query_builder = query_builder.bind(event_type);
        }
        if let Some(severities) = severities {
            let owned: Vec<String> = severities.iter().map(|s| s.to_string()).collect();
            query_builder = query_builder.bind(owned);
        }
        if let Some(start_date) = filters.start_date {
            query_builder = query_builder.bind(start_date);
        }
        if let Some(end_date) = filters.end_date {
            query_builder = query_builder.bind(end_date);
        }

        query_builder
    }
}
