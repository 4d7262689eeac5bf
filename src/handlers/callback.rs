//! `/oauth2/callback`: completes the identity provider round trip.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::cookies::{read_cookie, with_cookies};
use super::login::redirect_to_service;
use super::pages::{self, Page};
use crate::error::BridgeError;
use crate::service::{RuleAction, SERVICE_URL_COOKIE};
use crate::state::SharedContext;

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: String,
}

pub async fn oauth2_callback(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, BridgeError> {
    if params.code.is_empty() {
        return Err(BridgeError::Validation(pages::MSG_CODE_MISSING));
    }

    let token = ctx
        .idp
        .exchange(&params.code)
        .await
        .map_err(|e| BridgeError::upstream(pages::MSG_EXCHANGE_FAILED, e))?;

    if !token.is_valid() {
        warn!(expires_in = ?token.expires_in, "Identity provider returned an unusable token");
        return Err(BridgeError::upstream(
            pages::MSG_INVALID_TOKEN,
            anyhow::anyhow!("token response has no access token or is already expired"),
        ));
    }

    debug!(
        token_type = ?token.token_type,
        has_refresh_token = token.refresh_token.is_some(),
        extra_fields = token.extra.len(),
        "Token response accepted"
    );

    let subject = ctx
        .verifier
        .extract_subject(&token)
        .await
        .map_err(|e| BridgeError::upstream(pages::MSG_SUBJECT_FAILED, e))?;

    let service = read_cookie(&headers, SERVICE_URL_COOKIE).and_then(|token| {
        ctx.carrier
            .decrypt(&token)
            .map_err(|e| warn!(error = %e, "Discarding pending service URL"))
            .ok()
    });

    if let Some(ref service) = service {
        if !ctx.guard.is_allowed(service) {
            warn!(service = %service, "Pending service rejected by allow-list");
            return Err(BridgeError::RedirectPolicy(service.clone()));
        }
    }

    let tgt = ctx
        .authority
        .mint_tgt(&subject, ctx.session.tgt_duration_minutes)
        .map_err(BridgeError::Store)?;

    let mut cookies = vec![
        ctx.cookies
            .build(&ctx.session.tgt_cookie, &tgt, ctx.session.tgt_max_age_secs()),
        ctx.cookies.clear(SERVICE_URL_COOKIE),
    ];

    info!(subject = %subject, service = ?service, "Login completed");

    let Some(service) = service else {
        return Ok(with_cookies(
            Page::Login.respond(StatusCode::CREATED, pages::MSG_LOGIN_OK),
            cookies,
        ));
    };

    if let Some(RuleAction::UnsetCookie { cookie_name }) = ctx.rules.action_for(&service) {
        debug!(service = %service, cookie = %cookie_name, "Login rule clears cookie");
        cookies.push(ctx.cookies.clear(cookie_name));
    }

    match redirect_to_service(&ctx, &service, Some(&tgt), true) {
        Ok(response) => Ok(with_cookies(response, cookies)),
        Err(e) => {
            // The browser never receives this TGT.
            if let Err(delete_err) = ctx.authority.delete_tgt(&tgt) {
                warn!(error = %delete_err, "Failed to discard TGT after failed login");
            }
            Err(e)
        }
    }
}
