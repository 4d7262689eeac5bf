//! `/logout`: ends the single sign-on session.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde::Deserialize;
use tracing::{info, warn};

use super::cookies::{read_cookie, with_cookies};
use super::login::redirect;
use super::pages;
use crate::error::BridgeError;
use crate::state::SharedContext;

const DEFAULT_LOGOUT_REDIRECT: &str = "/login";

#[derive(Debug, Default, Deserialize)]
pub struct LogoutParams {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub service: String,
}

pub async fn logout(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Query(params): Query<LogoutParams>,
) -> Result<Response, BridgeError> {
    let tgt = read_cookie(&headers, &ctx.session.tgt_cookie)
        .ok_or(BridgeError::Validation(pages::MSG_LOGOUT_COOKIE_MISSING))?;

    ctx.authority.delete_tgt(&tgt).map_err(|e| {
        warn!(error = %e, "Logout could not delete TGT");
        BridgeError::Validation(pages::MSG_LOGOUT_DELETE_FAILED)
    })?;

    let mut cookies = vec![
        ctx.cookies.clear(&ctx.session.tgt_cookie),
        ctx.cookies.clear(&ctx.session.jsession_cookie),
    ];
    if let Some(ref another) = ctx.session.another_cookie {
        cookies.push(ctx.cookies.clear(another));
    }

    // Only allow-listed destinations; anything else lands on the login page.
    let location = [params.url.trim(), params.service.trim()]
        .into_iter()
        .find(|target| !target.is_empty())
        .filter(|target| {
            let allowed = ctx.guard.is_allowed(target);
            if !allowed {
                warn!(destination = %target, "Logout redirect rejected by allow-list");
            }
            allowed
        })
        .unwrap_or(DEFAULT_LOGOUT_REDIRECT);

    info!(location = %location, "Logged out");
    Ok(with_cookies(redirect(StatusCode::FOUND, location), cookies))
}
