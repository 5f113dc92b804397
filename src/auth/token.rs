//! JWT token issuance and verification
//!
//! Tokens are stateless bearer credentials embedding the principal's
//! claims. Verification is a pure local check against the signing secret
//! and the wall clock; it never touches the database.

use crate::{config::AppConfig, error::AppError, models::auth::Principal, models::user::Role};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Username
    pub username: String,

    /// Email
    pub email: String,

    /// Role ("user" | "admin")
    pub role: String,

    /// Issued at
    pub iat: i64,

    /// Expiration
    pub exp: i64,

    /// JWT ID (unique token identifier)
    pub jti: String,
}

impl Claims {
    /// Rebuild the verified principal from claims
    pub fn principal(&self) -> Result<Principal, AppError> {
        let id = Uuid::parse_str(&self.sub).map_err(|_| AppError::Unauthorized)?;
        Ok(Principal {
            id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: Role::from(self.role.as_str()),
        })
    }
}

/// Token service
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_exp_secs: u64,
    refresh_window_secs: u64,
}

impl TokenService {
    /// Create token service from config
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let secret = config.security.jwt_secret.expose_secret();

        // Ensure secret is at least 32 bytes for HS256
        if secret.len() < 32 {
            return Err(AppError::Config("JWT secret too short (min 32 chars)".to_string()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_exp_secs: config.security.token_exp_secs,
            refresh_window_secs: config.security.token_refresh_window_secs,
        })
    }

    pub fn token_exp_secs(&self) -> u64 {
        self.token_exp_secs
    }

    /// Issue a signed token for a principal
    pub fn issue(&self, principal: &Principal) -> Result<String, AppError> {
        let now = Utc::now();
        let expiration = now + Duration::seconds(self.token_exp_secs as i64);

        let claims = Claims {
            sub: principal.id.to_string(),
            username: principal.username.clone(),
            email: principal.email.clone(),
            role: principal.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode token: {:?}", e);
            AppError::Internal(format!("Failed to encode token: {}", e))
        })
    }

    /// Verify signature, structure and expiry; recover the claims
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        Ok(decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!("Token validation failed: {:?}", e);
                AppError::Unauthorized
            })?
            .claims)
    }

    /// True when the token is inside the refresh window before expiry,
    /// meaning a replacement should be issued proactively
    pub fn needs_refresh(&self, claims: &Claims) -> bool {
        let remaining = claims.exp - Utc::now().timestamp();
        remaining >= 0 && (remaining as u64) <= self.refresh_window_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_service(exp_secs: u64, refresh_window_secs: u64) -> TokenService {
        std::env::set_var("TP_DATABASE__URL", "postgresql://localhost/test");
        std::env::set_var("TP_SECURITY__TOKEN_EXP_SECS", exp_secs.to_string());
        std::env::set_var("TP_SECURITY__TOKEN_REFRESH_WINDOW_SECS", refresh_window_secs.to_string());

        let config = AppConfig::from_env().unwrap();
        let service = TokenService::from_config(&config).unwrap();

        std::env::remove_var("TP_DATABASE__URL");
        std::env::remove_var("TP_SECURITY__TOKEN_EXP_SECS");
        std::env::remove_var("TP_SECURITY__TOKEN_REFRESH_WINDOW_SECS");

        service
    }

    fn test_principal() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "testuser".to_string(),
            email: "test@example.com".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    #[serial]
    fn test_issue_and_verify_round_trip() {
        let service = test_service(900, 300);
        let principal = test_principal();

        let token = service.issue(&principal).unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.sub, principal.id.to_string());
        assert_eq!(claims.username, "testuser");
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.role, "admin");

        let recovered = claims.principal().unwrap();
        assert_eq!(recovered.id, principal.id);
        assert_eq!(recovered.role, Role::Admin);
    }

    #[test]
    #[serial]
    fn test_tampered_token_fails() {
        let service = test_service(900, 300);
        let token = service.issue(&test_principal()).unwrap();

        // 篡改最后一段（签名）
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });

        assert!(service.verify(&tampered).is_err());
        assert!(service.verify("not-a-jwt").is_err());
    }

    #[test]
    #[serial]
    fn test_expired_token_fails() {
        let service = test_service(900, 300);
        let principal = test_principal();
        let now = Utc::now().timestamp();

        let expired = Claims {
            sub: principal.id.to_string(),
            username: principal.username.clone(),
            email: principal.email.clone(),
            role: principal.role.as_str().to_string(),
            iat: now - 1_000,
            // 校验带 jsonwebtoken 默认 60 秒时钟宽限，过期须超出宽限
            exp: now - 120,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::default(), &expired, &service.encoding_key).unwrap();
        assert!(service.verify(&token).is_err());

        // 宽限以内的刚过期令牌仍被接受
        let barely_expired = Claims {
            exp: now - 30,
            ..expired
        };
        let token = encode(&Header::default(), &barely_expired, &service.encoding_key).unwrap();
        assert!(service.verify(&token).is_ok());
    }

    #[test]
    #[serial]
    fn test_needs_refresh_inside_window() {
        // 有效期 120 秒，续签窗口 90 秒
        let service = test_service(120, 90);
        let token = service.issue(&test_principal()).unwrap();
        let claims = service.verify(&token).unwrap();

        // 剩余 ~120 秒 > 90 秒窗口
        assert!(!service.needs_refresh(&claims));

        let near_expiry = Claims {
            exp: Utc::now().timestamp() + 30,
            ..claims
        };
        assert!(service.needs_refresh(&near_expiry));
    }
}
