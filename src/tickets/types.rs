//! Ticket records persisted by the ticket store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Service tickets live for five minutes regardless of the session lifetime.
pub const SERVICE_TICKET_TTL_SECS: i64 = 5 * 60;

/// An authenticated single sign-on session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketGrantingTicket {
    /// Ticket id (`TGT-` prefixed).
    pub id: String,

    /// Authenticated subject from the identity provider.
    pub subject: String,

    /// Issuance time.
    pub issued_at: DateTime<Utc>,

    /// First instant at which the ticket is no longer valid.
    pub expires_at: DateTime<Utc>,
}

impl TicketGrantingTicket {
    pub fn new(id: String, subject: String, now: DateTime<Utc>, ttl_minutes: i64) -> Self {
        Self {
            id,
            subject,
            issued_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }

    /// Valid iff `issued_at <= at < expires_at`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.issued_at <= at && at < self.expires_at
    }
}

/// A single-use credential redeemed by a relying service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTicket {
    /// Ticket id (`ST-` prefixed).
    pub id: String,

    /// Exact service string the ticket was issued for.
    pub service: String,

    /// Authenticated subject.
    pub subject: String,

    /// Session that produced this ticket.
    pub tgt: String,

    /// True when issued straight from a credential exchange rather than an
    /// existing session.
    pub is_direct: bool,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ServiceTicket {
    pub fn new(
        id: String,
        service: String,
        subject: String,
        tgt: String,
        is_direct: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            service,
            subject,
            tgt,
            is_direct,
            issued_at: now,
            expires_at: now + Duration::seconds(SERVICE_TICKET_TTL_SECS),
        }
    }

    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.issued_at <= at && at < self.expires_at
    }
}

/// Outcome of a service ticket validation. Invalid is a value, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceValidation {
    pub valid: bool,
    pub subject: String,
    pub is_direct: bool,
}

impl ServiceValidation {
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Apply the `renew` rule: a renew request only accepts tickets minted
    /// from a fresh credential exchange.
    pub fn honoring_renew(self, renew: bool) -> Self {
        if self.valid && renew && !self.is_direct {
            Self::invalid()
        } else {
            self
        }
    }
}

/// Outcome of a session lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionValidation {
    pub valid: bool,
    pub subject: String,
}

/// Outcome of a proxy ticket validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyValidation {
    pub subject: String,
    pub proxy_granting_ticket: String,
    pub proxies: Vec<String>,
}

impl ProxyValidation {
    pub fn is_recognized(&self) -> bool {
        !self.subject.is_empty()
    }
}
