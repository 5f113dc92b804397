//! 领域模型

pub mod auth;
pub mod security;
pub mod session;
pub mod user;
