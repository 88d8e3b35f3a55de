use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Kind of access a ticket grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Read,
    Write,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Read => "read",
            Op::Write => "write",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Op {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "read" => Ok(Op::Read),
            "write" => Ok(Op::Write),
            other => Err(format!("Unsupported operation: {other}")),
        }
    }
}

/// One chunked I/O pass bound to a ticket.
///
/// `offset` and `done` are read while the operation runs, so implementations
/// keep them in atomics. `cancel` only raises a flag; `run` notices it at the
/// next chunk boundary and returns [`Error::Canceled`](crate::Error::Canceled).
#[async_trait]
pub trait Operation: Send + Sync {
    fn offset(&self) -> u64;

    /// Bytes completed so far.
    fn done(&self) -> u64;

    async fn run(&self) -> Result<()>;

    fn cancel(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_string_forms() {
        assert_eq!("read".parse::<Op>(), Ok(Op::Read));
        assert_eq!("write".parse::<Op>(), Ok(Op::Write));
        assert!("delete".parse::<Op>().is_err());
        assert_eq!(Op::Write.to_string(), "write");
        assert_eq!(serde_json::to_value(Op::Read).unwrap(), "read");
    }
}
