//! Application context shared by all request handlers.

use std::sync::Arc;

use crate::handlers::cookies::CookieSettings;
use crate::oauth2::{IdTokenVerifier, IdentityProvider};
use crate::service::{LoginRules, ServiceUrlCarrier, ServiceUrlGuard};
use crate::tickets::{Clock, TicketAuthority, TicketStore, TokenSource};

/// Everything a handler needs, built once at startup and passed in
/// explicitly.
pub struct AppContext {
    pub authority: TicketAuthority,
    pub store: Arc<dyn TicketStore>,
    pub guard: ServiceUrlGuard,
    pub carrier: ServiceUrlCarrier,
    pub rules: LoginRules,
    pub idp: Arc<dyn IdentityProvider>,
    pub verifier: IdTokenVerifier,
    pub cookies: CookieSettings,
    pub session: SessionSettings,
    pub entropy: Arc<dyn TokenSource>,
    pub clock: Arc<dyn Clock>,
}

/// TGT cookie and the auxiliary cookies cleared on logout.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tgt_cookie: String,
    pub tgt_duration_minutes: i64,
    pub jsession_cookie: String,
    pub another_cookie: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tgt_cookie: "CASTGC".to_string(),
            tgt_duration_minutes: 480,
            jsession_cookie: "JSESSIONID".to_string(),
            another_cookie: None,
        }
    }
}

impl SessionSettings {
    pub fn tgt_max_age_secs(&self) -> i64 {
        self.tgt_duration_minutes * 60
    }
}

pub type SharedContext = Arc<AppContext>;
