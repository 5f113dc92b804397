//! 认证服务：登录、令牌续签、邮箱验证、密码重置入口
//!
//! 对外的失败消息刻意笼统（不区分"用户不存在"与"密码错误"），
//! 细节只进安全日志。

use crate::{
    auth::password::PasswordHasher,
    auth::token::{Claims, TokenService},
    error::AppError,
    models::auth::{LoginRequest, LoginResponse, PasswordResetRequest, Principal, VerifyEmailRequest},
    models::security::{RequestMeta, SecurityEventType, Severity},
    models::user::{User, UserResponse},
    repository::UserRepository,
    services::{ban_service, RateLimitAction, RateLimitService, SecurityService, SessionService},
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// 登录/验证成功后的凭据集合，由处理器转成 Set-Cookie
pub struct IssuedCredentials {
    pub user: UserResponse,
    pub token: String,
    pub session_token: String,
    pub expires_in: u64,
}

pub struct AuthService {
    db: PgPool,
    token_service: Arc<TokenService>,
    session_service: Arc<SessionService>,
    rate_limit_service: Arc<RateLimitService>,
    security_service: Arc<SecurityService>,
}

impl AuthService {
    pub fn new(
        db: PgPool,
        token_service: Arc<TokenService>,
        session_service: Arc<SessionService>,
        rate_limit_service: Arc<RateLimitService>,
        security_service: Arc<SecurityService>,
    ) -> Self {
        Self {
            db,
            token_service,
            session_service,
            rate_limit_service,
            security_service,
        }
    }

    /// 用户登录
    ///
    /// 顺序：限流 → 查用户 → 验密码 → 封禁检查 → 建会话 → 签令牌。
    /// 门禁失败全部短路，绝不默认放行。
    pub async fn login(
        &self,
        req: LoginRequest,
        meta: &RequestMeta,
    ) -> Result<IssuedCredentials, AppError> {
        self.rate_limit_service
            .enforce(&meta.source_ip, RateLimitAction::Login, meta)
            .await?;

        let user_repo = UserRepository::new(self.db.clone());
        let user = match user_repo.find_by_username(&req.username).await? {
            Some(user) => user,
            None => {
                self.record_login_failure(None, &req.username, "unknown_user", meta).await;
                return Err(AppError::Unauthorized);
            }
        };

        let hasher = PasswordHasher::new();
        if hasher.verify(&req.password, &user.password_hash).is_err() {
            self.record_login_failure(Some(user.id), &user.username, "bad_password", meta)
                .await;
            return Err(AppError::Unauthorized);
        }

        // 封禁否决认证；软过期的封禁不拦
        if let Err(ban_error) = ban_service::check_ban(&user) {
            self.record_login_failure(Some(user.id), &user.username, "banned", meta).await;
            return Err(ban_error);
        }

        self.issue_credentials(user, SecurityEventType::LoginSuccess, meta).await
    }

    /// 令牌临近过期时签发替换令牌；否则返回 None
    pub fn refresh(&self, principal: &Principal, claims: &Claims) -> Result<Option<String>, AppError> {
        if !self.token_service.needs_refresh(claims) {
            return Ok(None);
        }

        let token = self.token_service.issue(principal)?;
        tracing::debug!(user_id = %principal.id, "Token refreshed");
        Ok(Some(token))
    }

    /// 当前用户信息：credits 与封禁状态等派生字段取自最新的用户行
    pub async fn current_user(&self, principal: &Principal) -> Result<UserResponse, AppError> {
        let user_repo = UserRepository::new(self.db.clone());
        let user = user_repo
            .find_by_id(&principal.id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(UserResponse::from(user))
    }

    /// 密码重置请求：响应恒为笼统成功，防止邮箱枚举；
    /// 邮件投递由外部协作方完成
    pub async fn request_password_reset(
        &self,
        req: PasswordResetRequest,
        meta: &RequestMeta,
    ) -> Result<(), AppError> {
        self.rate_limit_service
            .enforce(&meta.source_ip, RateLimitAction::PasswordReset, meta)
            .await?;

        let user_repo = UserRepository::new(self.db.clone());
        let user = user_repo.find_by_email(&req.email).await?;

        self.security_service
            .record(
                user.as_ref().map(|u| u.id),
                SecurityEventType::PasswordResetRequest,
                Severity::Info,
                meta,
                Some(serde_json::json!({ "known_account": user.is_some() })),
            )
            .await;

        Ok(())
    }

    /// 兑换邮箱验证令牌；成功即视为登录，发放完整凭据
    pub async fn verify_email(
        &self,
        req: VerifyEmailRequest,
        meta: &RequestMeta,
    ) -> Result<IssuedCredentials, AppError> {
        self.rate_limit_service
            .enforce(&meta.source_ip, RateLimitAction::EmailVerification, meta)
            .await?;

        let user_repo = UserRepository::new(self.db.clone());
        let holder = match user_repo.find_by_verification_token(&req.token).await? {
            Some(user) => user,
            None => {
                self.security_service
                    .record(
                        None,
                        SecurityEventType::VerificationAttempt,
                        Severity::Warning,
                        meta,
                        Some(serde_json::json!({ "outcome": "invalid_token" })),
                    )
                    .await;
                return Err(AppError::BadRequest("Invalid or expired verification token".to_string()));
            }
        };

        // 封禁检查先于兑换：被封期间令牌不被消耗，解禁后仍可验证
        if let Err(ban_error) = ban_service::check_ban(&holder) {
            return Err(ban_error);
        }

        let user = user_repo
            .redeem_verification_token(&req.token)
            .await?
            .ok_or_else(|| AppError::BadRequest("Invalid or expired verification token".to_string()))?;

        self.issue_credentials(user, SecurityEventType::VerificationAttempt, meta).await
    }

    async fn issue_credentials(
        &self,
        user: User,
        event_type: SecurityEventType,
        meta: &RequestMeta,
    ) -> Result<IssuedCredentials, AppError> {
        let principal = Principal {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role(),
        };

        let (_session, session_token) = self.session_service.create(user.id).await?;
        let token = self.token_service.issue(&principal)?;

        self.security_service
            .record(
                Some(user.id),
                event_type,
                Severity::Info,
                meta,
                Some(serde_json::json!({ "username": user.username })),
            )
            .await;

        Ok(IssuedCredentials {
            user: UserResponse::from(user),
            token,
            session_token,
            expires_in: self.token_service.token_exp_secs(),
        })
    }

    async fn record_login_failure(
        &self,
        user_id: Option<Uuid>,
        username: &str,
        cause: &str,
        meta: &RequestMeta,
    ) {
        metrics::counter!("auth_failures_total", "kind" => "login").increment(1);
        self.security_service
            .record(
                user_id,
                SecurityEventType::LoginFailure,
                Severity::Warning,
                meta,
                Some(serde_json::json!({ "username": username, "cause": cause })),
            )
            .await;
    }
}

/// 登录响应体（令牌经 Set-Cookie 下发，不进响应体）
impl From<&IssuedCredentials> for LoginResponse {
    fn from(credentials: &IssuedCredentials) -> Self {
        LoginResponse {
            user: credentials.user.clone(),
            expires_in: credentials.expires_in,
        }
    }
}
