//! Session repository (会话数据访问)

use crate::{
    error::AppError,
    models::session::{Session, SessionWithUser, TerminationRecord},
};
use sqlx::PgPool;
use uuid::Uuid;

pub struct SessionRepository {
    db: PgPool,
}

impl SessionRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 插入会话行
    pub async fn insert(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 按令牌哈希查找仍然存活的会话
    pub async fn find_live_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE token_hash = $1 AND expires_at > NOW()",
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;

        Ok(session)
    }

    /// 按行 ID 查找会话（管理端终止入口）
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(session)
    }

    /// 删除单个会话（用户自行登出）；幂等
    pub async fn delete_by_token_hash(&self, token_hash: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// 删除某用户的全部会话；幂等，返回删除行数
    pub async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// 清理自然过期的会话行
    pub async fn delete_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// 管理端：列出所有存活会话及所属用户名
    pub async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<SessionWithUser>, AppError> {
        let sessions = sqlx::query_as::<_, SessionWithUser>(
            r#"
            SELECT s.id, s.user_id, u.username, s.created_at, s.expires_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.expires_at > NOW()
            ORDER BY s.created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(sessions)
    }

    /// 写入终止记录（追加写）
    pub async fn insert_termination(&self, record: &TerminationRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO session_terminations (id, user_id, terminated_by, terminated_at, reason)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.terminated_by)
        .bind(record.terminated_at)
        .bind(&record.reason)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 某用户最近一条终止记录，连同操作管理员的用户名
    pub async fn latest_termination(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(TerminationRecord, String)>, AppError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: Uuid,
            user_id: Uuid,
            terminated_by: Uuid,
            terminated_at: chrono::DateTime<chrono::Utc>,
            reason: String,
            admin_username: String,
        }

        let row = sqlx::query_as::<_, Row>(
            r#"
            SELECT t.id, t.user_id, t.terminated_by, t.terminated_at, t.reason,
                   u.username AS admin_username
            FROM session_terminations t
            JOIN users u ON u.id = t.terminated_by
            WHERE t.user_id = $1
            ORDER BY t.terminated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| {
            (
                TerminationRecord {
                    id: r.id,
                    user_id: r.user_id,
                    terminated_by: r.terminated_by,
                    terminated_at: r.terminated_at,
                    reason: r.reason,
                },
                r.admin_username,
            )
        }))
    }
}
