//! CAS ticket lifecycle.
//!
//! Tickets are persisted in redb, validated through `TicketAuthority`, and
//! reclaimed by a background sweep once expired.

pub mod authority;
pub mod cleanup;
pub mod clock;
pub mod ids;
pub mod store;
pub mod types;

pub use authority::TicketAuthority;
pub use cleanup::{spawn_cleanup_task, DEFAULT_CLEANUP_INTERVAL_SECS};
pub use clock::{Clock, SystemClock};
pub use ids::{OsEntropy, TokenSource};
pub use store::{RedbTicketStore, TicketStore};
pub use types::{ProxyValidation, ServiceValidation, SessionValidation};
