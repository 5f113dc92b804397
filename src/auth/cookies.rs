//! 认证 Cookie 的构造与解析
//!
//! `auth_token` 携带签名令牌，`session_id` 携带不透明会话令牌。
//! 两者均为 HttpOnly；生产环境加 Secure 标记。

use axum::http::HeaderMap;

pub const AUTH_COOKIE: &str = "auth_token";
pub const SESSION_COOKIE: &str = "session_id";

/// 构造 auth_token 的 Set-Cookie 值
pub fn auth_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    build(AUTH_COOKIE, token, max_age_secs, secure)
}

/// 构造 session_id 的 Set-Cookie 值（7 天 max-age 来自配置）
pub fn session_cookie(session_token: &str, max_age_secs: u64, secure: bool) -> String {
    build(SESSION_COOKIE, session_token, max_age_secs, secure)
}

/// 立即过期的 Set-Cookie 值，用于登出
pub fn expired_cookie(name: &str, secure: bool) -> String {
    build(name, "", 0, secure)
}

fn build(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// 从 Cookie 头中取出指定名字的值
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get("cookie")?.to_str().ok()?;

    raw.split(';').find_map(|pair| {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key == name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}
