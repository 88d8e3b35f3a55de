#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use transfer_auth::{ConnectionContext, Error, Operation, Result, Ticket};

/// Operation that blocks until released, like a chunk of I/O in flight.
/// Cancellation is noticed only after the current chunk completes.
pub struct ChunkedOperation {
    offset: u64,
    size: u64,
    done: AtomicU64,
    canceled: AtomicBool,
    release: Notify,
}

impl ChunkedOperation {
    pub fn new(offset: u64, size: u64) -> Arc<Self> {
        Arc::new(Self {
            offset,
            size,
            done: AtomicU64::new(0),
            canceled: AtomicBool::new(false),
            release: Notify::new(),
        })
    }

    pub fn ready(offset: u64, size: u64) -> Arc<Self> {
        let op = Self::new(offset, size);
        op.release();
        op
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn was_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Operation for ChunkedOperation {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    async fn run(&self) -> Result<()> {
        self.release.notified().await;
        if self.canceled.load(Ordering::Relaxed) {
            return Err(Error::Canceled);
        }
        self.done.store(self.size, Ordering::Relaxed);
        Ok(())
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct SocketContext {
    closed: AtomicUsize,
}

impl SocketContext {
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::Relaxed)
    }
}

impl ConnectionContext for SocketContext {
    fn close(&self) -> anyhow::Result<()> {
        self.closed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub fn ticket_record(uuid: &str, ops: Value) -> Value {
    json!({
        "uuid": uuid,
        "size": 1 << 20,
        "ops": ops,
        "timeout": 300,
        "url": "file:///var/lib/images/disk.raw",
        "transfer_id": format!("transfer-{uuid}"),
    })
}

/// Run `op` on `ticket` in a task and wait until the ticket sees it.
pub async fn spawn_run(ticket: &Arc<Ticket>, op: &Arc<ChunkedOperation>) -> JoinHandle<Result<()>> {
    let task = tokio::spawn({
        let ticket = Arc::clone(ticket);
        let op = Arc::clone(op);
        async move { ticket.run(op).await }
    });
    while !ticket.active() {
        tokio::task::yield_now().await;
    }
    task
}
