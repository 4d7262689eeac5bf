//! Request-level failures of the browser-facing endpoints.
//!
//! Protocol endpoints (`validate`, `serviceValidate`, `proxy`,
//! `proxyValidate`, `samlValidate`) render their own wire-format failures
//! and never return these.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

use crate::handlers::pages::{self, Page};
use crate::service::CarrierError;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or unusable request input.
    #[error("{0}")]
    Validation(&'static str),

    /// Service URL rejected by the allow-list.
    #[error("service not allowed: {0}")]
    RedirectPolicy(String),

    #[error("service URL carrier failed: {0}")]
    Carrier(#[from] CarrierError),

    /// Identity provider exchange or token problem. `message` is shown to the
    /// user, `cause` only logged.
    #[error("{message}: {cause:#}")]
    Upstream {
        message: &'static str,
        cause: anyhow::Error,
    },

    #[error("ticket store failed: {0:#}")]
    Store(anyhow::Error),
}

impl BridgeError {
    pub fn upstream(message: &'static str, cause: impl Into<anyhow::Error>) -> Self {
        BridgeError::Upstream {
            message,
            cause: cause.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            BridgeError::RedirectPolicy(_) => StatusCode::FORBIDDEN,
            BridgeError::Carrier(_) | BridgeError::Upstream { .. } | BridgeError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text safe to show a browser.
    pub fn user_message(&self) -> &'static str {
        match self {
            BridgeError::Validation(message) => *message,
            BridgeError::RedirectPolicy(_) => pages::MSG_SERVICE_NOT_ALLOWED,
            BridgeError::Upstream { message, .. } => *message,
            BridgeError::Carrier(_) | BridgeError::Store(_) => pages::MSG_INTERNAL,
        }
    }

    fn page(&self) -> Page {
        match self {
            BridgeError::Validation(_) | BridgeError::RedirectPolicy(_) => Page::Unauthorized,
            _ => Page::Error,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, status = status.as_u16(), "Request failed");
        }
        self.page().respond(status, self.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            BridgeError::Validation(pages::MSG_CODE_MISSING).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BridgeError::RedirectPolicy("https://evil.com/".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            BridgeError::upstream(pages::MSG_EXCHANGE_FAILED, anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            BridgeError::from(CarrierError::BadMac).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_user_message_hides_cause() {
        let err = BridgeError::upstream(pages::MSG_EXCHANGE_FAILED, anyhow!("client secret wrong"));
        assert_eq!(err.user_message(), "Error exchanging code for token");
        assert!(err.to_string().contains("client secret wrong"));

        let err = BridgeError::Store(anyhow!("disk full"));
        assert_eq!(err.user_message(), pages::MSG_INTERNAL);
    }

    #[tokio::test]
    async fn test_into_response_renders_page() {
        let response = BridgeError::RedirectPolicy("https://evil.com/".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("Service access is not allowed"));
        assert!(!body.contains("evil.com"));
    }
}
