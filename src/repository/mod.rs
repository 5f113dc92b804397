//! 数据访问层
//! 仅包含参数化查询；行在此边界映射为强类型模型

pub mod rate_limit_repo;
pub mod security_repo;
pub mod session_repo;
pub mod user_repo;

pub use rate_limit_repo::RateLimitRepository;
pub use security_repo::SecurityRepository;
pub use session_repo::SessionRepository;
pub use user_repo::UserRepository;
