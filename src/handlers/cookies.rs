//! Set-Cookie construction and Cookie header parsing.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use tracing::warn;

/// Attributes shared by every cookie the bridge writes.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            domain: None,
            path: "/".to_string(),
            secure: true,
            http_only: true,
            same_site: "Lax".to_string(),
        }
    }
}

impl CookieSettings {
    /// Build a Set-Cookie value.
    pub fn build(&self, name: &str, value: &str, max_age_secs: i64) -> String {
        let mut cookie = format!("{}={}", name, value);

        if let Some(ref domain) = self.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }

        cookie.push_str(&format!("; Path={}", self.path));

        if self.secure {
            cookie.push_str("; Secure");
        }

        if self.http_only {
            cookie.push_str("; HttpOnly");
        }

        cookie.push_str(&format!("; SameSite={}", self.same_site));
        cookie.push_str(&format!("; Max-Age={}", max_age_secs));

        cookie
    }

    /// Set-Cookie value that deletes `name`.
    pub fn clear(&self, name: &str) -> String {
        self.build(name, "", 0)
    }
}

/// Value of cookie `name` from the request, if present and non-empty.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|part| part.trim().strip_prefix(prefix.as_str()).map(str::to_string))
        .filter(|value| !value.is_empty())
}

/// Append Set-Cookie headers. Values that are not valid header text are
/// dropped.
pub fn with_cookies(mut response: Response, cookies: Vec<String>) -> Response {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Dropping invalid Set-Cookie value"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_build_cookie() {
        let settings = CookieSettings {
            domain: Some(".example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(
            settings.build("CASTGC", "TGT-abc", 28800),
            "CASTGC=TGT-abc; Domain=.example.com; Path=/; Secure; HttpOnly; SameSite=Lax; Max-Age=28800"
        );
    }

    #[test]
    fn test_clear_cookie() {
        let settings = CookieSettings {
            secure: false,
            http_only: false,
            ..Default::default()
        };
        assert_eq!(
            settings.clear("JSESSIONID"),
            "JSESSIONID=; Path=/; SameSite=Lax; Max-Age=0"
        );
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("a=1; CASTGC=TGT-xyz; XCASTGC=nope"),
        );
        assert_eq!(read_cookie(&headers, "CASTGC").as_deref(), Some("TGT-xyz"));
        assert_eq!(read_cookie(&headers, "a").as_deref(), Some("1"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_cookie_across_headers_and_empty_values() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("serviceURL="));
        headers.append(COOKIE, HeaderValue::from_static("CASTGC=TGT-1"));
        assert_eq!(read_cookie(&headers, "serviceURL"), None);
        assert_eq!(read_cookie(&headers, "CASTGC").as_deref(), Some("TGT-1"));
    }

    #[test]
    fn test_with_cookies_appends() {
        let response = with_cookies(
            StatusCode::OK.into_response(),
            vec!["a=1".to_string(), "b=2".to_string(), "bad=\n".to_string()],
        );
        let values: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(values.len(), 2);
    }
}
