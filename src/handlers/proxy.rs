//! `/proxy`: proxy ticket issuance.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;

use super::validate::cas_xml;
use crate::cas::{CasResponse, FailureCode};
use crate::state::SharedContext;

#[derive(Debug, Default, Deserialize)]
pub struct ProxyParams {
    #[serde(default)]
    pub pgt: String,
    #[serde(rename = "targetService", default)]
    pub target_service: String,
}

pub async fn proxy(State(ctx): State<SharedContext>, Query(params): Query<ProxyParams>) -> Response {
    if params.pgt.is_empty() || params.target_service.is_empty() {
        return cas_xml(
            StatusCode::BAD_REQUEST,
            CasResponse::ProxyFailure {
                code: FailureCode::InvalidRequest,
                description: "'pgt' and 'targetService' parameters are both required",
            },
        );
    }

    if !ctx.authority.validate_pgt(&params.pgt) {
        return cas_xml(
            StatusCode::UNAUTHORIZED,
            CasResponse::ProxyFailure {
                code: FailureCode::BadPgt,
                description: "The pgt provided was invalid",
            },
        );
    }

    let proxy_ticket = ctx.authority.mint_pt(&params.target_service, &params.pgt);
    cas_xml(
        StatusCode::OK,
        CasResponse::ProxySuccess {
            proxy_ticket: &proxy_ticket,
        },
    )
}
