//! Ticket identifier generation with an injectable entropy source.

use rand::rngs::OsRng;
use rand::RngCore;
#[cfg(test)]
use rand::{rngs::StdRng, SeedableRng};
#[cfg(test)]
use std::sync::Mutex;

/// Number of random bytes behind every ticket id (hex-encoded to 64 chars).
pub const TICKET_ENTROPY_BYTES: usize = 32;

/// Source of random bytes for ticket ids and SAML message ids.
pub trait TokenSource: Send + Sync {
    /// Fill `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]);

    /// Return `len` random bytes, hex-encoded.
    fn random_hex(&self, len: usize) -> String {
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes);
        hex::encode(bytes)
    }
}

/// Operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl TokenSource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

/// Deterministic source for tests.
#[cfg(test)]
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
}

#[cfg(test)]
impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[cfg(test)]
impl TokenSource for SeededEntropy {
    fn fill(&self, buf: &mut [u8]) {
        match self.rng.lock() {
            Ok(mut rng) => rng.fill_bytes(buf),
            Err(poisoned) => poisoned.into_inner().fill_bytes(buf),
        }
    }
}

/// Ticket families and their wire prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketKind {
    TicketGranting,
    Service,
    Proxy,
}

impl TicketKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            TicketKind::TicketGranting => "TGT-",
            TicketKind::Service => "ST-",
            TicketKind::Proxy => "PT-",
        }
    }

    /// Mint a fresh id of this kind.
    pub fn generate(&self, source: &dyn TokenSource) -> String {
        format!("{}{}", self.prefix(), source.random_hex(TICKET_ENTROPY_BYTES))
    }

    /// Classify an id by its prefix.
    pub fn of(id: &str) -> Option<Self> {
        [TicketKind::TicketGranting, TicketKind::Service, TicketKind::Proxy]
            .into_iter()
            .find(|kind| id.starts_with(kind.prefix()))
    }
}

/// Shorten a ticket id for log output.
pub fn redact(id: &str) -> String {
    let keep = id.find('-').map(|i| i + 9).unwrap_or(8);
    let head: String = id.chars().take(keep).collect();
    format!("{head}…")
}
