//! Background ticket expiry sweep.
//!
//! Lookups already ignore expired records; this task reclaims their space.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::store::RedbTicketStore;

pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Spawn a task that evicts expired tickets every `cleanup_interval_secs`.
///
/// Returns a `JoinHandle` that can be used to abort the task.
pub fn spawn_cleanup_task(
    store: Arc<RedbTicketStore>,
    clock: Arc<dyn Clock>,
    cleanup_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(cleanup_interval_secs.max(1)));

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match store.evict_expired(clock.now()) {
                Ok(0) => debug!("Ticket cleanup: nothing expired"),
                Ok(count) => info!(evicted = count, "Ticket cleanup completed"),
                Err(e) => warn!(error = %e, "Ticket cleanup failed"),
            }

            match store.counts() {
                Ok(counts) => debug!(
                    service_tickets = counts.service_tickets,
                    tgts = counts.ticket_granting_tickets,
                    "Ticket store status"
                ),
                Err(e) => debug!(error = %e, "Failed to count tickets"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::clock::ManualClock;
    use crate::tickets::store::TicketStore;
    use crate::tickets::types::TicketGrantingTicket;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cleanup_task_evicts_only_expired() {
        let dir = tempdir().unwrap();
        let store = Arc::new(RedbTicketStore::open(dir.path().join("tickets.redb")).unwrap());
        let now = Utc::now();

        store
            .insert_tgt(&TicketGrantingTicket::new(
                "TGT-live".to_string(),
                "alice".to_string(),
                now,
                60,
            ))
            .unwrap();
        store
            .insert_tgt(&TicketGrantingTicket::new(
                "TGT-dead".to_string(),
                "bob".to_string(),
                now - chrono::Duration::minutes(90),
                60,
            ))
            .unwrap();
        assert_eq!(store.counts().unwrap().ticket_granting_tickets, 2);

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now));
        let handle = spawn_cleanup_task(Arc::clone(&store), clock, 1);

        // Wait for at least one cleanup cycle
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();

        assert_eq!(store.counts().unwrap().ticket_granting_tickets, 1);
        assert!(store.find_tgt("TGT-live", now).unwrap().is_some());
    }
}
