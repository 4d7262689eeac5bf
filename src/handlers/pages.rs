//! Minimal HTML pages shown to browsers.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use quick_xml::escape::escape;

pub const MSG_LOGIN_OK: &str = "TGT successfully generated";
pub const MSG_CODE_MISSING: &str = "Authorization code missing";
pub const MSG_EXCHANGE_FAILED: &str = "Error exchanging code for token";
pub const MSG_INVALID_TOKEN: &str = "Invalid token";
pub const MSG_SUBJECT_FAILED: &str = "Error getting subject from token";
pub const MSG_TGT_MISSING: &str = "Ticket Granting Ticket is missing";
pub const MSG_NOT_LOGGED_IN: &str = "You are not logged in";
pub const MSG_SERVICE_NOT_ALLOWED: &str = "Service access is not allowed";
pub const MSG_LOGOUT_COOKIE_MISSING: &str = "TGT Cookie is missing";
pub const MSG_LOGOUT_DELETE_FAILED: &str = "Error deleting TGT";
pub const MSG_INTERNAL: &str = "Internal server error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Login,
    Unauthorized,
    Error,
}

impl Page {
    fn title(&self) -> &'static str {
        match self {
            Page::Login => "Login",
            Page::Unauthorized => "Unauthorized",
            Page::Error => "Error",
        }
    }

    pub fn render(&self, message: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<p>{message}</p>\n</body>\n</html>\n",
            title = self.title(),
            message = escape(message),
        )
    }

    pub fn respond(&self, status: StatusCode, message: &str) -> Response {
        (status, Html(self.render(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_escaped() {
        let html = Page::Error.render("<b>oops</b>");
        assert!(html.contains("<p>&lt;b&gt;oops&lt;/b&gt;</p>"));
        assert!(html.contains("<title>Error</title>"));
    }

    #[test]
    fn test_respond_status() {
        let response = Page::Login.respond(StatusCode::CREATED, MSG_LOGIN_OK);
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
