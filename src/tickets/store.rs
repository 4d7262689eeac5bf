//! Ticket store contract and its redb implementation.
//!
//! The store owns durability and expiry of tickets:
//! - service tickets are consumed with an atomic find-and-delete
//! - expired records are ignored on read and swept by a background task
//! - ticket-granting tickets survive lookups until logout or expiry

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::PathBuf;
use tracing::{debug, warn};

use super::ids::redact;
use super::types::{ServiceTicket, TicketGrantingTicket};

/// redb table for service tickets (key: ticket id, value: MessagePack bytes).
const SERVICE_TICKETS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("service_tickets");

/// redb table for ticket-granting tickets (key: ticket id, value: MessagePack bytes).
const TGT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("ticket_granting_tickets");

/// Durable record of issued tickets.
///
/// `find_and_consume_service_ticket` must read and delete in one atomic step:
/// two concurrent validations of the same ticket may not both observe it.
pub trait TicketStore: Send + Sync {
    fn insert_service_ticket(&self, ticket: &ServiceTicket) -> Result<()>;

    fn insert_tgt(&self, tgt: &TicketGrantingTicket) -> Result<()>;

    /// Remove and return the ticket iff its id and service match exactly and
    /// it is unexpired at `now`. Anything else leaves the store untouched.
    fn find_and_consume_service_ticket(
        &self,
        ticket: &str,
        service: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ServiceTicket>>;

    /// Look up an unexpired session without consuming it.
    fn find_tgt(&self, token: &str, now: DateTime<Utc>) -> Result<Option<TicketGrantingTicket>>;

    /// Delete a session. Returns whether a record was removed.
    fn delete_tgt(&self, token: &str) -> Result<bool>;

    /// Cheap liveness probe for the health check.
    fn ping(&self) -> Result<()>;
}

/// Counts of stored records (expired or not).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub service_tickets: usize,
    pub ticket_granting_tickets: usize,
}

/// Ticket store backed by an embedded redb database.
pub struct RedbTicketStore {
    db: Database,
}

impl RedbTicketStore {
    /// Open or create a ticket store at the given path.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let db = Database::create(&path)
            .with_context(|| format!("Failed to open ticket database: {:?}", path))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SERVICE_TICKETS_TABLE)?;
            let _ = write_txn.open_table(TGT_TABLE)?;
        }
        write_txn.commit()?;

        let store = Self { db };
        let counts = store.counts()?;
        debug!(
            service_tickets = counts.service_tickets,
            tgts = counts.ticket_granting_tickets,
            "Ticket store opened"
        );

        Ok(store)
    }

    /// Number of records in each table.
    pub fn counts(&self) -> Result<StoreCounts> {
        let read_txn = self.db.begin_read()?;
        let service_tickets = read_txn.open_table(SERVICE_TICKETS_TABLE)?.len()? as usize;
        let ticket_granting_tickets = read_txn.open_table(TGT_TABLE)?.len()? as usize;
        Ok(StoreCounts {
            service_tickets,
            ticket_granting_tickets,
        })
    }

    /// Delete every record expired at `now`, plus any record that no longer
    /// decodes. Returns the number of records removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let (expired_sts, expired_tgts) = {
            let read_txn = self.db.begin_read()?;

            let mut sts = Vec::new();
            for entry in read_txn.open_table(SERVICE_TICKETS_TABLE)?.iter()? {
                let (key, value) = entry?;
                match rmp_serde::from_slice::<ServiceTicket>(value.value()) {
                    Ok(st) if st.is_valid_at(now) => {}
                    Ok(_) => sts.push(key.value().to_string()),
                    Err(e) => {
                        warn!(error = %e, "Failed to deserialize service ticket, marking for deletion");
                        sts.push(key.value().to_string());
                    }
                }
            }

            let mut tgts = Vec::new();
            for entry in read_txn.open_table(TGT_TABLE)?.iter()? {
                let (key, value) = entry?;
                match rmp_serde::from_slice::<TicketGrantingTicket>(value.value()) {
                    Ok(tgt) if now < tgt.expires_at => {}
                    Ok(_) => tgts.push(key.value().to_string()),
                    Err(e) => {
                        warn!(error = %e, "Failed to deserialize TGT, marking for deletion");
                        tgts.push(key.value().to_string());
                    }
                }
            }

            (sts, tgts)
        };

        if expired_sts.is_empty() && expired_tgts.is_empty() {
            return Ok(0);
        }

        let mut evicted = 0;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SERVICE_TICKETS_TABLE)?;
            for id in &expired_sts {
                if table.remove(id.as_str())?.is_some() {
                    evicted += 1;
                }
            }

            let mut table = write_txn.open_table(TGT_TABLE)?;
            for id in &expired_tgts {
                if table.remove(id.as_str())?.is_some() {
                    evicted += 1;
                }
            }
        }
        write_txn.commit()?;

        Ok(evicted)
    }

    fn insert(&self, table: TableDefinition<&str, &[u8]>, key: &str, data: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.insert(key, data)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl TicketStore for RedbTicketStore {
    fn insert_service_ticket(&self, ticket: &ServiceTicket) -> Result<()> {
        let data = rmp_serde::to_vec(ticket).context("Failed to serialize service ticket")?;
        self.insert(SERVICE_TICKETS_TABLE, &ticket.id, &data)
    }

    fn insert_tgt(&self, tgt: &TicketGrantingTicket) -> Result<()> {
        let data = rmp_serde::to_vec(tgt).context("Failed to serialize TGT")?;
        self.insert(TGT_TABLE, &tgt.id, &data)
    }

    fn find_and_consume_service_ticket(
        &self,
        ticket: &str,
        service: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ServiceTicket>> {
        // redb admits one write transaction at a time, so the read and the
        // delete below cannot interleave with another consumer.
        let write_txn = self.db.begin_write()?;
        let consumed = {
            let mut table = write_txn.open_table(SERVICE_TICKETS_TABLE)?;

            let record: Option<ServiceTicket> = {
                let guard = table.get(ticket)?;
                match guard {
                    Some(value) => Some(
                        rmp_serde::from_slice(value.value())
                            .context("Failed to deserialize service ticket")?,
                    ),
                    None => None,
                }
            };

            match record {
                Some(st) if st.service == service && st.is_valid_at(now) => {
                    table.remove(ticket)?;
                    Some(st)
                }
                Some(st) => {
                    debug!(
                        ticket = %redact(ticket),
                        service_matches = st.service == service,
                        expired = !st.is_valid_at(now),
                        "Service ticket rejected"
                    );
                    None
                }
                None => None,
            }
        };

        if consumed.is_some() {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }

        Ok(consumed)
    }

    fn find_tgt(&self, token: &str, now: DateTime<Utc>) -> Result<Option<TicketGrantingTicket>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TGT_TABLE)?;

        match table.get(token)? {
            Some(value) => {
                let tgt: TicketGrantingTicket = rmp_serde::from_slice(value.value())
                    .context("Failed to deserialize TGT")?;
                Ok(tgt.is_valid_at(now).then_some(tgt))
            }
            None => Ok(None),
        }
    }

    fn delete_tgt(&self, token: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TGT_TABLE)?;
            let result = table.remove(token)?;
            result.is_some()
        };
        write_txn.commit()?;

        Ok(removed)
    }

    fn ping(&self) -> Result<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(TGT_TABLE)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_store() -> (RedbTicketStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tickets.redb");
        let store = RedbTicketStore::open(path).unwrap();
        (store, dir)
    }

    fn service_ticket(id: &str, service: &str, now: DateTime<Utc>) -> ServiceTicket {
        ServiceTicket::new(
            id.to_string(),
            service.to_string(),
            "alice".to_string(),
            "TGT-1".to_string(),
            true,
            now,
        )
    }

    #[test]
    fn test_consume_is_single_use() {
        let (store, _dir) = test_store();
        let now = Utc::now();
        store
            .insert_service_ticket(&service_ticket("ST-1", "https://app.example.com/", now))
            .unwrap();

        let first = store
            .find_and_consume_service_ticket("ST-1", "https://app.example.com/", now)
            .unwrap();
        assert_eq!(first.unwrap().subject, "alice");

        let second = store
            .find_and_consume_service_ticket("ST-1", "https://app.example.com/", now)
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_wrong_service_does_not_consume() {
        let (store, _dir) = test_store();
        let now = Utc::now();
        store
            .insert_service_ticket(&service_ticket("ST-2", "https://app.example.com/", now))
            .unwrap();

        assert!(store
            .find_and_consume_service_ticket("ST-2", "https://other.example.com/", now)
            .unwrap()
            .is_none());
        assert!(store
            .find_and_consume_service_ticket("ST-2", "https://app.example.com/", now)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_expired_service_ticket_is_not_found() {
        let (store, _dir) = test_store();
        let now = Utc::now();
        store
            .insert_service_ticket(&service_ticket("ST-3", "svc", now))
            .unwrap();

        let later = now + Duration::minutes(5);
        assert!(store
            .find_and_consume_service_ticket("ST-3", "svc", later)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_tgt_lookup_and_delete() {
        let (store, _dir) = test_store();
        let now = Utc::now();
        let tgt = TicketGrantingTicket::new("TGT-9".to_string(), "bob".to_string(), now, 60);
        store.insert_tgt(&tgt).unwrap();

        assert_eq!(store.find_tgt("TGT-9", now).unwrap(), Some(tgt.clone()));
        // Lookups do not consume.
        assert!(store.find_tgt("TGT-9", now).unwrap().is_some());
        assert!(store.find_tgt("TGT-9", tgt.expires_at).unwrap().is_none());

        assert!(store.delete_tgt("TGT-9").unwrap());
        assert!(!store.delete_tgt("TGT-9").unwrap());
        assert!(store.find_tgt("TGT-9", now).unwrap().is_none());
    }

    #[test]
    fn test_ping() {
        let (store, _dir) = test_store();
        assert!(store.ping().is_ok());
    }

    #[test]
    fn test_evict_expired() {
        let (store, _dir) = test_store();
        let now = Utc::now();
        store
            .insert_service_ticket(&service_ticket("ST-old", "svc", now - Duration::minutes(10)))
            .unwrap();
        store
            .insert_service_ticket(&service_ticket("ST-new", "svc", now))
            .unwrap();
        store
            .insert_tgt(&TicketGrantingTicket::new(
                "TGT-old".to_string(),
                "bob".to_string(),
                now - Duration::minutes(120),
                60,
            ))
            .unwrap();

        assert_eq!(store.evict_expired(now).unwrap(), 2);
        let counts = store.counts().unwrap();
        assert_eq!(counts.service_tickets, 1);
        assert_eq!(counts.ticket_granting_tickets, 0);
    }

    #[test]
    fn test_concurrent_consumers_see_ticket_once() {
        let (store, _dir) = test_store();
        let store = Arc::new(store);
        let now = Utc::now();
        store
            .insert_service_ticket(&service_ticket("ST-race", "svc", now))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .find_and_consume_service_ticket("ST-race", "svc", now)
                        .unwrap()
                        .is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
