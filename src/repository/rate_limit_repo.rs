//! Rate limit counter repository (限流计数数据访问)
//!
//! 计数器持久化在库里：并发处理器共享同一计数，进程重启不清零。

use crate::error::AppError;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

pub struct RateLimitRepository {
    db: PgPool,
}

impl RateLimitRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 取或建当前窗口的计数行并自增，返回自增后的计数
    ///
    /// 必须在单条语句内完成 upsert-and-increment：
    /// 并发调用下丢失或重复计数都会削弱限流保证
    pub async fn increment(
        &self,
        ip: &str,
        action: &str,
        window_start: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query(
            r#"
            INSERT INTO rate_limit_counters (ip, action, window_start, count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (ip, action, window_start)
            DO UPDATE SET count = rate_limit_counters.count + 1
            RETURNING count
            "#,
        )
        .bind(ip)
        .bind(action)
        .bind(window_start)
        .fetch_one(&self.db)
        .await?
        .get(0);

        Ok(count)
    }

    /// 清理已经关闭的旧窗口
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE window_start < $1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
