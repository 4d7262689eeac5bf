//! Ticket issuance and validation.
//!
//! `TicketAuthority` is the only place that decides ticket formats and
//! lifetimes. Validation outcomes are values: a missing, expired, or
//! mismatched ticket is reported as invalid, never as an error. Errors are
//! reserved for the store itself failing.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use super::clock::Clock;
use super::ids::{redact, TicketKind, TokenSource};
use super::store::TicketStore;
use super::types::{
    ProxyValidation, ServiceTicket, ServiceValidation, SessionValidation, TicketGrantingTicket,
};

pub struct TicketAuthority {
    store: Arc<dyn TicketStore>,
    entropy: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
}

impl TicketAuthority {
    pub fn new(
        store: Arc<dyn TicketStore>,
        entropy: Arc<dyn TokenSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            entropy,
            clock,
        }
    }

    /// Start a session for `subject` lasting `ttl_minutes`.
    pub fn mint_tgt(&self, subject: &str, ttl_minutes: i64) -> Result<String> {
        let id = TicketKind::TicketGranting.generate(self.entropy.as_ref());
        let tgt = TicketGrantingTicket::new(id, subject.to_string(), self.clock.now(), ttl_minutes);

        self.store
            .insert_tgt(&tgt)
            .context("Failed to persist TGT")?;

        info!(
            tgt = %redact(&tgt.id),
            subject = %subject,
            expires_at = %tgt.expires_at,
            "TGT issued"
        );
        Ok(tgt.id)
    }

    /// Issue a single-use ticket for `service`. Lifetime is fixed at five
    /// minutes whatever the session lifetime.
    pub fn mint_st(&self, service: &str, subject: &str, tgt: &str, is_direct: bool) -> Result<String> {
        let id = TicketKind::Service.generate(self.entropy.as_ref());
        let st = ServiceTicket::new(
            id,
            service.to_string(),
            subject.to_string(),
            tgt.to_string(),
            is_direct,
            self.clock.now(),
        );

        self.store
            .insert_service_ticket(&st)
            .context("Failed to persist service ticket")?;

        info!(
            ticket = %redact(&st.id),
            service = %service,
            subject = %subject,
            is_direct,
            "Service ticket issued"
        );
        Ok(st.id)
    }

    /// Proxy tickets are minted but never stored; nothing can redeem them.
    pub fn mint_pt(&self, service: &str, pgt: &str) -> String {
        let id = TicketKind::Proxy.generate(self.entropy.as_ref());
        debug!(
            ticket = %redact(&id),
            pgt = %redact(pgt),
            service = %service,
            "Proxy ticket minted"
        );
        id
    }

    /// Redeem a service ticket. On success the ticket is gone from the store
    /// before this returns.
    pub fn validate_st(&self, ticket: &str, service: &str) -> Result<ServiceValidation> {
        let consumed = self
            .store
            .find_and_consume_service_ticket(ticket, service, self.clock.now())
            .context("Failed to look up service ticket")?;

        match consumed {
            Some(st) => {
                info!(
                    ticket = %redact(ticket),
                    service = %service,
                    subject = %st.subject,
                    "Service ticket validated"
                );
                Ok(ServiceValidation {
                    valid: true,
                    subject: st.subject,
                    is_direct: st.is_direct,
                })
            }
            None => {
                debug!(ticket = %redact(ticket), service = %service, "Service ticket not valid");
                Ok(ServiceValidation::invalid())
            }
        }
    }

    /// Check a session without consuming it.
    pub fn validate_tgt(&self, token: &str) -> Result<SessionValidation> {
        let found = self
            .store
            .find_tgt(token, self.clock.now())
            .context("Failed to look up TGT")?;

        Ok(match found {
            Some(tgt) => SessionValidation {
                valid: true,
                subject: tgt.subject,
            },
            None => {
                debug!(tgt = %redact(token), "TGT not valid");
                SessionValidation::default()
            }
        })
    }

    /// Proxy-granting tickets are not tracked; every one is accepted.
    pub fn validate_pgt(&self, _pgt: &str) -> bool {
        true
    }

    /// Proxy tickets are never persisted, so none is ever recognised.
    pub fn validate_pt(&self, ticket: &str, service: &str) -> ProxyValidation {
        debug!(ticket = %redact(ticket), service = %service, "Proxy ticket validation is not supported");
        ProxyValidation::default()
    }

    pub fn delete_tgt(&self, token: &str) -> Result<bool> {
        let removed = self
            .store
            .delete_tgt(token)
            .context("Failed to delete TGT")?;
        info!(tgt = %redact(token), removed, "TGT deleted");
        Ok(removed)
    }
}
