//! 会话服务与终止广播
//!
//! 会话行是"这次登录仍然有效"的服务端事实，与令牌有效期无关。
//! 终止是拉取式传播：删掉会话行，受影响客户端在下一次有状态
//! 请求收到 401 session_terminated 后自行清理并跳转。

use crate::{
    error::AppError,
    models::security::{RequestMeta, SecurityEventType, Severity},
    models::session::{Session, SessionWithUser, TerminationOutcome, TerminationRecord},
    repository::SessionRepository,
    services::SecurityService,
};
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub struct SessionService {
    db: PgPool,
    session_ttl_secs: u64,
    security: Arc<SecurityService>,
}

impl SessionService {
    pub fn new(db: PgPool, session_ttl_secs: u64, security: Arc<SecurityService>) -> Self {
        Self {
            db,
            session_ttl_secs,
            security,
        }
    }

    pub fn session_ttl_secs(&self) -> u64 {
        self.session_ttl_secs
    }

    /// 创建会话；返回会话行和仅此一次可见的原始令牌
    ///
    /// 库里只存 SHA-256 哈希，Cookie 携带原始值
    pub async fn create(&self, user_id: Uuid) -> Result<(Session, String), AppError> {
        let raw_token = generate_session_token();
        let now = Utc::now();

        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_session_token(&raw_token),
            created_at: now,
            expires_at: now + Duration::seconds(self.session_ttl_secs as i64),
        };

        let repo = SessionRepository::new(self.db.clone());
        repo.insert(&session).await?;

        Ok((session, raw_token))
    }

    /// 按 Cookie 里的原始令牌确认会话存活
    ///
    /// 行缺失与过期一视同仁：401 session_terminated
    pub async fn verify(&self, raw_token: &str) -> Result<Session, AppError> {
        let repo = SessionRepository::new(self.db.clone());
        repo.find_live_by_token_hash(&hash_session_token(raw_token))
            .await?
            .ok_or(AppError::SessionExpired)
    }

    /// 用户自行登出：只删当前会话，其他设备不受影响；幂等
    pub async fn logout(&self, raw_token: &str) -> Result<(), AppError> {
        let repo = SessionRepository::new(self.db.clone());
        repo.delete_by_token_hash(&hash_session_token(raw_token)).await?;
        Ok(())
    }

    /// 管理端：终止目标会话所属用户的**全部**会话（log out everywhere）
    pub async fn terminate(
        &self,
        session_id: Uuid,
        terminated_by: Uuid,
        reason: &str,
        meta: &RequestMeta,
    ) -> Result<TerminationOutcome, AppError> {
        let repo = SessionRepository::new(self.db.clone());

        let session = repo.find_by_id(session_id).await?.ok_or(AppError::NotFound)?;
        let user_id = session.user_id;

        let terminated_sessions = repo.delete_all_for_user(user_id).await?;

        let record = TerminationRecord {
            id: Uuid::new_v4(),
            user_id,
            terminated_by,
            terminated_at: Utc::now(),
            reason: reason.to_string(),
        };
        repo.insert_termination(&record).await?;

        tracing::info!(
            %user_id,
            %terminated_by,
            terminated_sessions,
            "All sessions terminated for user"
        );

        self.security
            .record(
                Some(user_id),
                SecurityEventType::SessionInvalidated,
                Severity::Warning,
                meta,
                Some(serde_json::json!({
                    "terminated_by": terminated_by,
                    "terminated_sessions": terminated_sessions,
                    "reason": reason,
                })),
            )
            .await;
        self.security
            .record(
                Some(terminated_by),
                SecurityEventType::AdminAction,
                Severity::Warning,
                meta,
                Some(serde_json::json!({ "action": "terminate_sessions", "target": user_id })),
            )
            .await;

        Ok(TerminationOutcome {
            user_id,
            terminated_sessions,
        })
    }

    /// 最近一次终止的人类可读说明，供被终止客户端事后展示
    pub async fn termination_notice(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let repo = SessionRepository::new(self.db.clone());

        Ok(repo.latest_termination(user_id).await?.map(|(record, admin)| {
            format!(
                "Your sessions were terminated by {} at {}: {}",
                admin,
                record.terminated_at.format("%Y-%m-%d %H:%M UTC"),
                record.reason
            )
        }))
    }

    /// 管理端：存活会话列表
    pub async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<SessionWithUser>, AppError> {
        let repo = SessionRepository::new(self.db.clone());
        repo.list_active(limit, offset).await
    }

    /// 清理自然过期的会话
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let repo = SessionRepository::new(self.db.clone());
        repo.delete_expired().await
    }
}

/// 生成 32 字节随机会话令牌（hex 编码）
fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 会话令牌落库前的哈希
pub fn hash_session_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
