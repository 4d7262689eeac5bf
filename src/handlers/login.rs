//! `/login`: single sign-on entry point.

use axum::extract::{Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::cookies::{read_cookie, with_cookies};
use super::pages::{self, Page};
use crate::error::BridgeError;
use crate::service::{SERVICE_URL_COOKIE, SERVICE_URL_MAX_AGE_SECS};
use crate::state::{AppContext, SharedContext};
use crate::tickets::ids::TICKET_ENTROPY_BYTES;

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub renew: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
}

/// CAS boolean parameters are true only when spelled `true`.
pub fn flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

pub async fn login(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Query(params): Query<LoginParams>,
) -> Result<Response, BridgeError> {
    let service = params.service.trim();
    let renew = flag(params.renew.as_deref());
    let gateway = flag(params.gateway.as_deref());
    let tgt = read_cookie(&headers, &ctx.session.tgt_cookie);

    let has_session = match tgt.as_deref() {
        Some(token) => ctx
            .authority
            .validate_tgt(token)
            .map_err(BridgeError::Store)?
            .valid,
        None => false,
    };

    if !renew && has_session {
        debug!(service = %service, "Existing session, skipping identity provider");
        return redirect_to_service(&ctx, service, tgt.as_deref(), false);
    }

    if gateway && !renew {
        // Gateway never prompts.
        if service.is_empty() {
            debug!("Gateway request without session or service");
            return Ok(Page::Unauthorized.respond(
                StatusCode::UNAUTHORIZED,
                pages::MSG_NOT_LOGGED_IN,
            ));
        }
        if !ctx.guard.is_allowed(service) {
            warn!(service = %service, "Gateway service rejected by allow-list");
            return Err(BridgeError::RedirectPolicy(service.to_string()));
        }
        info!(service = %service, "Gateway request without session, passing through");
        return Ok(redirect(StatusCode::SEE_OTHER, service));
    }

    let carried = if service.is_empty() {
        ctx.cookies.clear(SERVICE_URL_COOKIE)
    } else {
        let token = ctx.carrier.encrypt(service)?;
        ctx.cookies
            .build(SERVICE_URL_COOKIE, &token, SERVICE_URL_MAX_AGE_SECS)
    };

    let state = ctx.entropy.random_hex(TICKET_ENTROPY_BYTES);
    let location = ctx.idp.authorization_url(&state);
    info!(service = %service, renew, "Redirecting to identity provider");

    Ok(with_cookies(
        redirect(StatusCode::FOUND, &location),
        vec![carried],
    ))
}

/// Issue a service ticket for an authenticated session and send the browser
/// back to `service`. Without a service, show the logged-in page.
pub fn redirect_to_service(
    ctx: &AppContext,
    service: &str,
    tgt: Option<&str>,
    is_direct: bool,
) -> Result<Response, BridgeError> {
    if service.is_empty() {
        return Ok(Page::Login.respond(StatusCode::OK, pages::MSG_LOGIN_OK));
    }

    if !ctx.guard.is_allowed(service) {
        warn!(service = %service, "Service rejected by allow-list");
        return Err(BridgeError::RedirectPolicy(service.to_string()));
    }

    let tgt = tgt.ok_or(BridgeError::Validation(pages::MSG_TGT_MISSING))?;
    let session = ctx.authority.validate_tgt(tgt).map_err(BridgeError::Store)?;
    if !session.valid {
        return Err(BridgeError::Validation(pages::MSG_TGT_MISSING));
    }

    let ticket = ctx
        .authority
        .mint_st(service, &session.subject, tgt, is_direct)
        .map_err(BridgeError::Store)?;

    Ok(redirect(StatusCode::FOUND, &ticket_url(service, &ticket)))
}

/// `service` with the ticket appended as a query parameter.
pub fn ticket_url(service: &str, ticket: &str) -> String {
    let separator = if service.contains('?') { '&' } else { '?' };
    format!("{}{}ticket={}", service, separator, ticket)
}

pub fn redirect(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = status.into_response();
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(e) => {
            warn!(error = %e, "Redirect target is not a valid header value");
            Page::Error.respond(StatusCode::INTERNAL_SERVER_ERROR, pages::MSG_INTERNAL)
        }
    }
}
