//! Ticket validation endpoints used by services.
//!
//! Every failure here is rendered in the protocol's own wire format.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use super::login::flag;
use crate::cas::response::{TEXT_CONTENT_TYPE, XML_CONTENT_TYPE};
use crate::cas::{plain_validate, CasResponse, FailureCode};
use crate::saml::response::CONTENT_TYPE as SOAP_CONTENT_TYPE;
use crate::saml::{ArtifactRequest, SamlResponder};
use crate::state::SharedContext;
use crate::tickets::ids::TicketKind;

const MSG_ST_OR_SERVICE_MISSING: &str = "Service Ticket or Service URL is missing";
const MSG_INVALID_ST: &str = "Invalid Service Ticket";
const MSG_PARAMS_REQUIRED: &str = "'ticket' and 'service' parameters are both required";
const MSG_TICKET_NOT_RECOGNIZED: &str = "Ticket not recognized";
const MSG_VALIDATION_FAILED: &str = "Error in validation process";
const MSG_SAML_INVALID_REQUEST: &str = "Invalid SAML Request";
const MSG_SAML_INVALID_TICKET: &str = "Invalid SAML Ticket or Service";

#[derive(Debug, Default, Deserialize)]
pub struct ValidateParams {
    #[serde(default)]
    pub ticket: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub renew: Option<String>,
}

impl ValidateParams {
    fn is_complete(&self) -> bool {
        !self.ticket.is_empty() && !self.service.is_empty()
    }

    fn renew(&self) -> bool {
        flag(self.renew.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SamlParams {
    #[serde(rename = "TARGET", default)]
    pub target: String,
    #[serde(default)]
    pub renew: Option<String>,
}

pub(crate) fn cas_xml(status: StatusCode, response: CasResponse<'_>) -> Response {
    if !response.is_success() {
        debug!(status = status.as_u16(), "CAS request rejected");
    }
    (status, [(CONTENT_TYPE, XML_CONTENT_TYPE)], response.to_xml()).into_response()
}

fn plain(status: StatusCode, user: Option<&str>) -> Response {
    (status, [(CONTENT_TYPE, TEXT_CONTENT_TYPE)], plain_validate(user)).into_response()
}

/// CAS 1.0 plain-text validation.
pub async fn validate(
    State(ctx): State<SharedContext>,
    Query(params): Query<ValidateParams>,
) -> Response {
    if !params.is_complete() {
        return plain(StatusCode::BAD_REQUEST, None);
    }

    match ctx.authority.validate_st(&params.ticket, &params.service) {
        Ok(result) => {
            let result = result.honoring_renew(params.renew());
            if result.valid {
                plain(StatusCode::OK, Some(&result.subject))
            } else {
                plain(StatusCode::UNAUTHORIZED, None)
            }
        }
        Err(e) => {
            warn!(error = %e, "Ticket validation failed");
            plain(StatusCode::INTERNAL_SERVER_ERROR, None)
        }
    }
}

/// CAS 2.0 XML validation.
pub async fn service_validate(
    State(ctx): State<SharedContext>,
    Query(params): Query<ValidateParams>,
) -> Response {
    if !params.is_complete() {
        return cas_xml(
            StatusCode::UNAUTHORIZED,
            CasResponse::AuthenticationFailure {
                code: FailureCode::InvalidRequest,
                description: MSG_ST_OR_SERVICE_MISSING,
            },
        );
    }

    match ctx.authority.validate_st(&params.ticket, &params.service) {
        Ok(result) => {
            let result = result.honoring_renew(params.renew());
            if result.valid {
                cas_xml(
                    StatusCode::OK,
                    CasResponse::AuthenticationSuccess {
                        user: &result.subject,
                    },
                )
            } else {
                cas_xml(
                    StatusCode::UNAUTHORIZED,
                    CasResponse::AuthenticationFailure {
                        code: FailureCode::InvalidTicket,
                        description: MSG_INVALID_ST,
                    },
                )
            }
        }
        Err(e) => {
            warn!(error = %e, "Ticket validation failed");
            cas_xml(
                StatusCode::INTERNAL_SERVER_ERROR,
                CasResponse::AuthenticationFailure {
                    code: FailureCode::InternalError,
                    description: MSG_VALIDATION_FAILED,
                },
            )
        }
    }
}

/// CAS 2.0 validation that also accepts proxy tickets. Service tickets are
/// redeemed as in `serviceValidate`; proxy tickets go through the proxy
/// contract, which recognises none.
pub async fn proxy_validate(
    State(ctx): State<SharedContext>,
    Query(params): Query<ValidateParams>,
) -> Response {
    if !params.is_complete() {
        return cas_xml(
            StatusCode::BAD_REQUEST,
            CasResponse::AuthenticationFailure {
                code: FailureCode::InvalidRequest,
                description: MSG_PARAMS_REQUIRED,
            },
        );
    }

    let not_recognized = || {
        cas_xml(
            StatusCode::UNAUTHORIZED,
            CasResponse::AuthenticationFailure {
                code: FailureCode::InvalidTicket,
                description: MSG_TICKET_NOT_RECOGNIZED,
            },
        )
    };

    if TicketKind::of(&params.ticket) == Some(TicketKind::Service) {
        return match ctx.authority.validate_st(&params.ticket, &params.service) {
            Ok(result) => {
                let result = result.honoring_renew(params.renew());
                if result.valid {
                    cas_xml(
                        StatusCode::OK,
                        CasResponse::ProxyAuthenticationSuccess {
                            user: &result.subject,
                            proxy_granting_ticket: "",
                            proxies: &[],
                        },
                    )
                } else {
                    not_recognized()
                }
            }
            Err(e) => {
                warn!(error = %e, "Ticket validation failed");
                cas_xml(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    CasResponse::AuthenticationFailure {
                        code: FailureCode::InternalError,
                        description: MSG_VALIDATION_FAILED,
                    },
                )
            }
        };
    }

    let result = ctx.authority.validate_pt(&params.ticket, &params.service);
    if !result.is_recognized() {
        return not_recognized();
    }

    cas_xml(
        StatusCode::OK,
        CasResponse::ProxyAuthenticationSuccess {
            user: &result.subject,
            proxy_granting_ticket: &result.proxy_granting_ticket,
            proxies: &result.proxies,
        },
    )
}

/// SAML 1.1 artifact validation.
pub async fn saml_validate(
    State(ctx): State<SharedContext>,
    Query(params): Query<SamlParams>,
    body: Bytes,
) -> Response {
    let responder = SamlResponder::new(ctx.entropy.as_ref());
    let denied = |message: &str| {
        (
            StatusCode::FORBIDDEN,
            [(CONTENT_TYPE, SOAP_CONTENT_TYPE)],
            responder.failure(message, ctx.clock.now()),
        )
            .into_response()
    };

    let request = match std::str::from_utf8(&body)
        .map_err(|e| e.to_string())
        .and_then(|xml| ArtifactRequest::parse(xml).map_err(|e| e.to_string()))
    {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejecting SAML request");
            return denied(MSG_SAML_INVALID_REQUEST);
        }
    };

    let target = params.target.trim();
    if target.is_empty() {
        return denied(MSG_SAML_INVALID_TICKET);
    }

    let result = match ctx.authority.validate_st(&request.artifact, target) {
        Ok(result) => result.honoring_renew(flag(params.renew.as_deref())),
        Err(e) => {
            warn!(error = %e, "SAML ticket validation failed");
            return denied(MSG_VALIDATION_FAILED);
        }
    };

    if !result.valid {
        debug!(request_id = ?request.request_id, "SAML artifact not valid for target");
        return denied(MSG_SAML_INVALID_TICKET);
    }

    (
        StatusCode::OK,
        [(CONTENT_TYPE, SOAP_CONTENT_TYPE)],
        responder.success(target, &result.subject, ctx.clock.now()),
    )
        .into_response()
}
