//! Authentication-related models

use crate::models::user::{Role, UserResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// 经过验证的身份主体，由中间件从已校验的令牌派生，
/// 以显式参数传入处理器，绝不直接信任请求状态
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    /// 令牌有效期（秒），令牌本体经 Set-Cookie 下发
    pub expires_in: u64,
}

/// Password reset request (delivery handled by an external mailer)
#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

/// Email verification token redemption
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[validate(length(min = 16, max = 128))]
    pub token: String,
}

/// Admin ban request
#[derive(Debug, Deserialize, Validate)]
pub struct BanRequest {
    #[validate(length(min = 3, max = 500))]
    pub reason: String,
    /// "permanent" 或 "<n>_<unit>"，例如 "7_days"
    #[validate(length(min = 1, max = 32))]
    pub duration: String,
}

/// Admin alert resolution request（前端载荷为 camelCase）
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAlertRequest {
    pub alert_id: Uuid,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}
