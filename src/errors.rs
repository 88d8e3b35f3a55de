use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid ticket: {0}, expecting a JSON object")]
    InvalidTicket(String),
    #[error("Missing ticket parameter: {0}")]
    MissingTicketParameter(&'static str),
    #[error("Invalid ticket parameter {field}={value}: {reason}")]
    InvalidTicketParameter {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0}")]
    Authorization(String),
    #[error("Timeout cancelling transfer {0}")]
    TransferCancelTimeout(String),
    #[error("No such ticket {0}")]
    NoSuchTicket(String),
    #[error("Transfer {transfer_id} has no connection {con_id}")]
    NoSuchContext { transfer_id: String, con_id: u64 },
    #[error("Operation was canceled")]
    Canceled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_parameter(
        field: &'static str,
        value: impl ToString,
        reason: impl ToString,
    ) -> Self {
        Error::InvalidTicketParameter {
            field,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Only a cancel timeout may be retried; the ticket is still registered
    /// and a second removal waits on the same drain.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransferCancelTimeout(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidTicket(_)
            | Error::MissingTicketParameter(_)
            | Error::InvalidTicketParameter { .. } => StatusCode::BAD_REQUEST,
            Error::Authorization(_) => StatusCode::FORBIDDEN,
            Error::NoSuchTicket(_) | Error::NoSuchContext { .. } => StatusCode::NOT_FOUND,
            Error::TransferCancelTimeout(_) => StatusCode::CONFLICT,
            Error::Canceled | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let status = self.status();
        let message = self.to_string();
        (status, Json(ErrorResponse { message })).into_response()
    }
}
