//! HTTP surface: routes and request handlers.

pub mod callback;
pub mod cookies;
pub mod login;
pub mod logout;
pub mod pages;
pub mod proxy;
pub mod validate;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::warn;

use crate::state::SharedContext;

/// Build the router over a fully constructed context.
pub fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/login", get(login::login).post(login::login))
        .route("/oauth2/callback", get(callback::oauth2_callback))
        .route("/validate", get(validate::validate))
        .route("/serviceValidate", get(validate::service_validate))
        .route("/proxyValidate", get(validate::proxy_validate))
        .route("/samlValidate", post(validate::saml_validate))
        .route("/proxy", get(proxy::proxy))
        .route("/logout", get(logout::logout).post(logout::logout))
        .route("/healthcheck", get(healthcheck))
        .with_state(ctx)
}

async fn healthcheck(State(ctx): State<SharedContext>) -> Response {
    match ctx.store.ping() {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "up" }))).into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "down" })),
            )
                .into_response()
        }
    }
}
