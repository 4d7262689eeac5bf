//! Service URL handling: redirect allow-list, encrypted carrier cookie, and
//! post-login rules keyed by service hostname.

pub mod carrier;
pub mod guard;
pub mod rules;

pub use carrier::{CarrierError, ServiceUrlCarrier, SERVICE_URL_COOKIE, SERVICE_URL_MAX_AGE_SECS};
pub use guard::ServiceUrlGuard;
pub use rules::{LoginRules, RuleAction};
