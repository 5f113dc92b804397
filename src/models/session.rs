//! 会话与终止记录模型
//!
//! 会话行独立于令牌自身的有效期存在，是管理员强制失效的抓手。
//! Cookie 只携带随机令牌，库里存 SHA-256 哈希。

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Server-side session row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// 管理端会话列表行（联取所属用户名）
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SessionWithUser {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Append-only audit entry written when all of a user's sessions are killed
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TerminationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub terminated_by: Uuid,
    pub terminated_at: DateTime<Utc>,
    pub reason: String,
}

/// 终止操作的结果（前端载荷为 camelCase）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminationOutcome {
    pub user_id: Uuid,
    pub terminated_sessions: u64,
}
