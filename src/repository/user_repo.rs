//! User repository (数据库访问层)

use crate::{error::AppError, models::user::User};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct UserRepository {
    db: PgPool,
}

impl UserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 根据用户名查找用户
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 根据邮箱查找用户
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 根据 ID 查找用户
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 写入封禁状态
    pub async fn apply_ban(
        &self,
        id: Uuid,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
        banned_by: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET
                is_banned = TRUE,
                ban_reason = $2,
                ban_expires_at = $3,
                banned_by = $4,
                banned_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(expires_at)
        .bind(banned_by)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 解除封禁
    pub async fn clear_ban(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET
                is_banned = FALSE,
                ban_reason = NULL,
                ban_expires_at = NULL,
                banned_by = NULL,
                banned_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 根据验证令牌查找用户（只读，不消耗令牌）
    pub async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE verification_token = $1")
            .bind(token)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 根据验证令牌查找用户并标记邮箱已验证（令牌一次性）
    pub async fn redeem_verification_token(&self, token: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET
                email_verified = TRUE,
                verification_token = NULL,
                updated_at = NOW()
            WHERE verification_token = $1
            RETURNING *
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }
}
