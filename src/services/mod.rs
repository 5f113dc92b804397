//! 业务服务层

pub mod auth_service;
pub mod ban_service;
pub mod rate_limit_service;
pub mod security_service;
pub mod session_service;

pub use auth_service::AuthService;
pub use ban_service::BanService;
pub use rate_limit_service::{RateLimitAction, RateLimitDecision, RateLimitService};
pub use security_service::SecurityService;
pub use session_service::SessionService;
