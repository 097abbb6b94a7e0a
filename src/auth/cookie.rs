//! Cookie parsing and `Set-Cookie` construction for the token pair.

use axum::http::header;

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Attributes shared by every auth cookie this server sets.
#[derive(Debug, Clone, Default)]
pub struct CookieSettings {
    /// Add the `Secure` attribute (production behind HTTPS)
    pub secure: bool,
    /// Optional `Domain` attribute
    pub domain: Option<String>,
}

impl CookieSettings {
    /// Build a `Set-Cookie` value carrying `value` for `max_age` seconds.
    pub fn set(&self, name: &str, value: &str, max_age: u64) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
            name,
            value,
            max_age,
            self.suffix()
        )
    }

    /// Build a `Set-Cookie` value that removes the cookie.
    pub fn clear(&self, name: &str) -> String {
        format!(
            "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{}",
            name,
            self.suffix()
        )
    }

    fn suffix(&self) -> String {
        let mut suffix = String::new();
        if let Some(domain) = &self.domain {
            suffix.push_str("; Domain=");
            suffix.push_str(domain);
        }
        if self.secure {
            suffix.push_str("; Secure");
        }
        suffix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("accessToken=abc123"));

        assert_eq!(get_cookie(&headers, ACCESS_COOKIE_NAME), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; accessToken=abc123; refreshToken=xyz789"),
        );

        assert_eq!(get_cookie(&headers, ACCESS_COOKIE_NAME), Some("abc123"));
        assert_eq!(get_cookie(&headers, REFRESH_COOKIE_NAME), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));

        assert_eq!(get_cookie(&headers, ACCESS_COOKIE_NAME), None);
        assert_eq!(get_cookie(&axum::http::HeaderMap::new(), "foo"), None);
    }

    #[test]
    fn test_set_cookie_defaults() {
        let settings = CookieSettings::default();
        assert_eq!(
            settings.set(ACCESS_COOKIE_NAME, "tok", 900),
            "accessToken=tok; HttpOnly; SameSite=Lax; Path=/; Max-Age=900"
        );
    }

    #[test]
    fn test_secure_cookie_with_domain() {
        let settings = CookieSettings {
            secure: true,
            domain: Some("shop.example.com".into()),
        };
        assert_eq!(
            settings.clear(REFRESH_COOKIE_NAME),
            "refreshToken=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; Domain=shop.example.com; Secure"
        );
    }
}
