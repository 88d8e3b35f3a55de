//! A ticket grants time-limited access to one image for a set of operations.
//!
//! Operations run through [`Ticket::run`], which registers them for the
//! duration of the I/O. Registration is what lets [`Ticket::cancel`] stop a
//! transfer: once canceled, no operation or connection can be added, ongoing
//! operations are asked to stop, and the caller may wait until the last one
//! is gone before the ticket is dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::measure::{Range, RangeSet};
use crate::ops::{Op, Operation};
use crate::record::TicketRecord;
use crate::util::MonotonicClock;

pub type ConnectionId = u64;

/// Per-connection state owned by a ticket while the connection uses it.
///
/// `close` may be called more than once and must release the transport
/// resources on the first call.
pub trait ConnectionContext: Send + Sync {
    fn close(&self) -> anyhow::Result<()>;
}

type OperationId = u64;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Outcome of unregistering an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    /// The operation finished on a live ticket and was accounted for.
    Completed,
    /// The ticket was canceled while the operation ran; `drained` is set when
    /// it was the last ongoing operation.
    Canceled { drained: bool },
}

#[derive(Default)]
struct State {
    ongoing: HashMap<OperationId, Arc<dyn Operation>>,
    completed: RangeSet,
    canceled: bool,
    connections: HashMap<ConnectionId, Arc<dyn ConnectionContext>>,
}

impl State {
    fn close_connections(&self, transfer_id: &str) {
        for (con_id, context) in &self.connections {
            if let Err(err) = context.close() {
                warn!(transfer_id, con_id, error = %err, "Failed to close connection context");
            }
        }
    }
}

pub struct Ticket {
    uuid: String,
    size: u64,
    ops: Vec<Op>,
    url: Url,
    transfer_id: String,
    filename: Option<String>,
    sparse: bool,
    dirty: bool,
    timeout: u64,
    inactivity_timeout: u64,
    clock: MonotonicClock,
    expires: AtomicU64,
    access_time: AtomicU64,
    state: Mutex<State>,
    // Holds true once a canceled ticket has no ongoing operations.
    unused: watch::Sender<bool>,
}

/// Point-in-time view of a ticket for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketInfo {
    pub active: bool,
    pub canceled: bool,
    pub connections: usize,
    pub expires: u64,
    pub idle_time: u64,
    pub inactivity_timeout: u64,
    pub ops: Vec<Op>,
    pub size: u64,
    pub sparse: bool,
    pub dirty: bool,
    pub timeout: u64,
    pub url: String,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferred: Option<u64>,
}

impl Ticket {
    pub fn new(value: &Value, config: &Config, clock: MonotonicClock) -> Result<Self> {
        let record = TicketRecord::from_value(value)?;
        Ok(Self::from_record(record, config, clock))
    }

    pub fn from_record(record: TicketRecord, config: &Config, clock: MonotonicClock) -> Self {
        // Older management servers do not send a transfer id; derive a
        // likely unique one from the first half of the uuid.
        let transfer_id = record.transfer_id.unwrap_or_else(|| {
            let prefix: String = record.uuid.chars().take(18).collect();
            format!("(ticket/{prefix})")
        });

        let now = clock.now();
        let (unused, _) = watch::channel(false);

        Self {
            uuid: record.uuid,
            size: record.size,
            ops: record.ops,
            url: record.url,
            transfer_id,
            filename: record.filename,
            sparse: record.sparse,
            dirty: record.dirty,
            timeout: record.timeout,
            inactivity_timeout: record
                .inactivity_timeout
                .unwrap_or(config.daemon.inactivity_timeout),
            clock,
            expires: AtomicU64::new(now.saturating_add(record.timeout)),
            access_time: AtomicU64::new(now),
            state: Mutex::new(State::default()),
            unused,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn sparse(&self) -> bool {
        self.sparse
    }

    /// Whether the ticket url must serve dirty extents.
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    /// Seconds to wait before disconnecting an inactive client.
    pub fn inactivity_timeout(&self) -> u64 {
        self.inactivity_timeout
    }

    pub fn expires(&self) -> u64 {
        self.expires.load(Ordering::Acquire)
    }

    pub fn canceled(&self) -> bool {
        self.state.lock().canceled
    }

    pub fn active(&self) -> bool {
        !self.state.lock().ongoing.is_empty()
    }

    /// Seconds since the ticket became inactive, zero while in use.
    pub fn idle_time(&self) -> u64 {
        if self.active() {
            return 0;
        }
        self.clock
            .now()
            .saturating_sub(self.access_time.load(Ordering::Acquire))
    }

    pub fn add_context(
        &self,
        con_id: ConnectionId,
        context: Arc<dyn ConnectionContext>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.canceled {
            return Err(self.canceled_error());
        }

        debug!(transfer_id = %self.transfer_id, con_id, "Adding connection context");
        state.connections.insert(con_id, context);
        Ok(())
    }

    /// Only the connection owning `con_id` looks up its context, so a
    /// concurrent removal of the same id cannot happen.
    pub fn get_context(&self, con_id: ConnectionId) -> Result<Arc<dyn ConnectionContext>> {
        self.state
            .lock()
            .connections
            .get(&con_id)
            .cloned()
            .ok_or_else(|| Error::NoSuchContext {
                transfer_id: self.transfer_id.clone(),
                con_id,
            })
    }

    pub fn remove_context(&self, con_id: ConnectionId) {
        let mut state = self.state.lock();
        let Some(context) = state.connections.remove(&con_id) else {
            return;
        };

        debug!(transfer_id = %self.transfer_id, con_id, "Removing connection context");
        if let Err(err) = context.close() {
            warn!(transfer_id = %self.transfer_id, con_id, error = %err, "Failed to close connection context");
        }
    }

    /// Run `operation` bound to this ticket.
    ///
    /// An operation stopped by cancellation is not an error by itself, but a
    /// canceled ticket never reports an operation as completed: the caller
    /// gets [`Error::Authorization`] instead.
    pub async fn run(&self, operation: Arc<dyn Operation>) -> Result<()> {
        let id = self.add_operation(Arc::clone(&operation))?;

        let outcome = operation.run().await;

        match self.remove_operation(id, operation.as_ref()) {
            Removal::Canceled { drained } => {
                debug!(transfer_id = %self.transfer_id, drained, "Operation finished on canceled transfer");
                Err(self.canceled_error())
            }
            Removal::Completed => match outcome {
                Err(Error::Canceled) => {
                    debug!(transfer_id = %self.transfer_id, "Operation was canceled");
                    Ok(())
                }
                other => other,
            },
        }
    }

    /// Extend the ticket and update the last access time.
    pub fn touch(&self) {
        let now = self.clock.now();
        self.expires
            .store(now.saturating_add(self.timeout), Ordering::Release);
        self.access_time.store(now, Ordering::Release);
    }

    pub fn extend(&self, timeout: u64) {
        self.expires
            .store(self.clock.now().saturating_add(timeout), Ordering::Release);
    }

    fn add_operation(&self, operation: Arc<dyn Operation>) -> Result<OperationId> {
        let mut state = self.state.lock();
        if state.canceled {
            return Err(self.canceled_error());
        }

        let id = NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed);
        state.ongoing.insert(id, operation);
        Ok(id)
    }

    fn remove_operation(&self, id: OperationId, operation: &dyn Operation) -> Removal {
        let removal = {
            let mut state = self.state.lock();
            state.ongoing.remove(&id);

            if state.canceled {
                let drained = state.ongoing.is_empty();
                if drained {
                    debug!(transfer_id = %self.transfer_id, "Removed last ongoing operation");
                    self.unused.send_replace(true);
                }
                Removal::Canceled { drained }
            } else {
                // Ranges of read-write tickets cannot be merged meaningfully.
                if self.ops.len() == 1 {
                    let start = operation.offset();
                    state
                        .completed
                        .add(Range::new(start, start.saturating_add(operation.done())));
                }
                Removal::Completed
            }
        };

        self.touch();
        removal
    }

    /// Bytes transferred so far, or `None` for read-write tickets.
    pub fn transferred(&self) -> Option<u64> {
        if self.ops.len() > 1 {
            return None;
        }

        let (mut completed, ongoing) = {
            let state = self.state.lock();
            let ongoing: Vec<Range> = state
                .ongoing
                .values()
                .map(|op| {
                    let start = op.offset();
                    Range::new(start, start.saturating_add(op.done()))
                })
                .collect();
            (state.completed.clone(), ongoing)
        };

        completed.update(ongoing);
        Some(completed.sum())
    }

    /// Writing implies reading.
    pub fn may(&self, op: Op) -> bool {
        match op {
            Op::Read => self.ops.contains(&Op::Read) || self.ops.contains(&Op::Write),
            other => self.ops.contains(&other),
        }
    }

    pub fn info(&self) -> TicketInfo {
        let (canceled, connections) = {
            let state = self.state.lock();
            (state.canceled, state.connections.len())
        };

        TicketInfo {
            active: self.active(),
            canceled,
            connections,
            expires: self.expires(),
            idle_time: self.idle_time(),
            inactivity_timeout: self.inactivity_timeout,
            ops: self.ops.clone(),
            size: self.size,
            sparse: self.sparse,
            dirty: self.dirty,
            timeout: self.timeout,
            url: self.url.to_string(),
            uuid: self.uuid.clone(),
            transfer_id: Some(self.transfer_id.clone()).filter(|id| !id.is_empty()),
            filename: self.filename.clone(),
            transferred: self.transferred(),
        }
    }

    /// Cancel the ticket and wait until all ongoing operations finish.
    ///
    /// Returns `Ok(true)` when the ticket is unused and can be removed. With
    /// a zero `timeout` this does not wait: `Ok(false)` means operations are
    /// still running and the caller must poll [`Ticket::active`] and cancel
    /// again. A non-zero `timeout` that expires with operations still running
    /// fails with [`Error::TransferCancelTimeout`]; the ticket stays canceled.
    pub async fn cancel(&self, timeout: Duration) -> Result<bool> {
        debug!(transfer_id = %self.transfer_id, "Cancelling transfer");

        {
            let mut state = self.state.lock();
            state.canceled = true;

            if state.ongoing.is_empty() {
                // Idle connections may still hold resources.
                state.close_connections(&self.transfer_id);
                debug!(transfer_id = %self.transfer_id, "Transfer was canceled");
                return Ok(true);
            }

            debug!(transfer_id = %self.transfer_id, "Canceling ongoing operations");
            for operation in state.ongoing.values() {
                operation.cancel();
            }
        }

        if timeout.is_zero() {
            return Ok(false);
        }

        info!(transfer_id = %self.transfer_id, "Waiting until ongoing operations finish");
        let mut unused = self.unused.subscribe();
        let drained = matches!(
            tokio::time::timeout(timeout, unused.wait_for(|unused| *unused)).await,
            Ok(Ok(_))
        );
        if !drained {
            return Err(Error::TransferCancelTimeout(self.transfer_id.clone()));
        }

        self.state.lock().close_connections(&self.transfer_id);
        info!(transfer_id = %self.transfer_id, "Transfer was canceled");
        Ok(true)
    }

    fn canceled_error(&self) -> Error {
        Error::Authorization(format!("Transfer {} was canceled", self.transfer_id))
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        f.debug_struct("Ticket")
            .field("active", &info.active)
            .field("canceled", &info.canceled)
            .field("connections", &info.connections)
            .field("expires", &info.expires)
            .field("inactivity_timeout", &info.inactivity_timeout)
            .field("filename", &info.filename)
            .field("idle_time", &info.idle_time)
            .field("ops", &info.ops)
            .field("size", &info.size)
            .field("sparse", &info.sparse)
            .field("dirty", &info.dirty)
            .field("transfer_id", &self.transfer_id)
            .field("transferred", &info.transferred)
            .field("url", &info.url)
            .field("uuid", &info.uuid)
            .finish()
    }
}
