use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::ops::Op;
use crate::ticket::Ticket;
use crate::util::MonotonicClock;

/// Store of active tickets, keyed by ticket uuid.
///
/// The map has its own lock so the management plane and transfer handlers
/// can call in concurrently. The lock is never held while a removal waits
/// for a ticket to drain.
pub struct Authorizer {
    config: Arc<Config>,
    clock: MonotonicClock,
    tickets: RwLock<HashMap<String, Arc<Ticket>>>,
}

impl Authorizer {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }

    pub fn with_clock(config: Arc<Config>, clock: MonotonicClock) -> Self {
        Self {
            config,
            clock,
            tickets: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Add a ticket, replacing any ticket with the same uuid.
    pub async fn add(&self, value: &Value) -> Result<()> {
        let ticket = Ticket::new(value, &self.config, self.clock)?;
        debug!(uuid = %ticket.uuid(), transfer_id = %ticket.transfer_id(), "Adding ticket");

        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.uuid().to_string(), Arc::new(ticket));
        Ok(())
    }

    /// Cancel a ticket and remove it once it is unused.
    ///
    /// With a zero remove timeout a busy ticket stays registered and canceled;
    /// the caller polls it and removes again. A cancel timeout propagates and
    /// also leaves the ticket registered, so a retry waits on the same
    /// transfer.
    pub async fn remove(&self, ticket_id: &str) -> Result<()> {
        let ticket = {
            let tickets = self.tickets.read().await;
            match tickets.get(ticket_id) {
                Some(ticket) => Arc::clone(ticket),
                None => {
                    debug!(ticket_id, "Ticket does not exist");
                    return Ok(());
                }
            }
        };

        let timeout = Duration::from_secs(self.config.control.remove_timeout);
        if ticket.cancel(timeout).await? {
            let mut tickets = self.tickets.write().await;
            // The uuid may have been re-added while we waited.
            if tickets
                .get(ticket_id)
                .is_some_and(|current| Arc::ptr_eq(current, &ticket))
            {
                tickets.remove(ticket_id);
                debug!(ticket_id, "Ticket removed");
            }
        }

        Ok(())
    }

    /// Drop every ticket without cancelling it.
    pub async fn clear(&self) {
        self.tickets.write().await.clear();
    }

    pub async fn get(&self, ticket_id: &str) -> Result<Arc<Ticket>> {
        self.tickets
            .read()
            .await
            .get(ticket_id)
            .cloned()
            .ok_or_else(|| Error::NoSuchTicket(ticket_id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.read().await.is_empty()
    }

    /// Check that `op` may run on the ticket now and return the ticket to run
    /// it on.
    pub async fn authorize(&self, ticket_id: &str, op: Op) -> Result<Arc<Ticket>> {
        let ticket = self
            .tickets
            .read()
            .await
            .get(ticket_id)
            .cloned()
            .ok_or_else(|| Error::Authorization(format!("No such ticket {ticket_id}")))?;

        debug!(%op, transfer_id = %ticket.transfer_id(), "AUTH");

        if ticket.canceled() {
            return Err(Error::Authorization(format!(
                "Transfer={} was canceled",
                ticket.transfer_id()
            )));
        }

        if ticket.expires() <= self.clock.now() {
            return Err(Error::Authorization(format!(
                "Transfer={} expired",
                ticket.transfer_id()
            )));
        }

        if !ticket.may(op) {
            return Err(Error::Authorization(format!(
                "Transfer={} forbids {}",
                ticket.transfer_id(),
                op
            )));
        }

        Ok(ticket)
    }
}
