use thiserror::Error;

use crate::models::call::{CallId, RemoteError, TransactionId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("no route registered for {service}.{method}")]
    Routing { service: String, method: String },

    #[error("transaction {transaction_id} failed: {cause}")]
    Transport {
        transaction_id: TransactionId,
        cause: String,
    },

    #[error("call {call_id} failed remotely: {error}")]
    Remote { call_id: CallId, error: RemoteError },

    #[error("transaction {transaction_id} returned no result for call {call_id}")]
    MissingResponse {
        transaction_id: TransactionId,
        call_id: CallId,
    },

    #[error("failed to encode or decode call payload: {0}")]
    Codec(String),

    #[error("dispatcher is shut down")]
    Shutdown,
}

impl DispatchError {
    /// Whether the caller may reasonably re-dispatch the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Transport { .. })
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
