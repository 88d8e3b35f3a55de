//! Ticket based authorization for image transfers.
//!
//! The management plane registers tickets with an [`Authorizer`]. Transfer
//! handlers authorize every request against it and run their I/O through
//! [`Ticket::run`], which lets a later removal cancel the transfer and wait
//! for it to drain.

pub mod auth;
pub mod backends;
pub mod config;
pub mod errors;
pub mod measure;
pub mod ops;
pub mod record;
pub mod ticket;
pub mod util;

pub use auth::Authorizer;
pub use config::{Config, ConfigError};
pub use errors::{Error, Result};
pub use ops::{Op, Operation};
pub use ticket::{ConnectionContext, ConnectionId, Ticket, TicketInfo};
pub use util::MonotonicClock;
