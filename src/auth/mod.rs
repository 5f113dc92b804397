//! 认证模块

pub mod cookies;
pub mod middleware;
pub mod password;
pub mod token;

pub use token::TokenService;
