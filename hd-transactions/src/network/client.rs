//! Game server RPC client contract.
//!
//! Calls return boxed `'static` futures so the manager can keep them in flight
//! without borrowing the client, and poll them from its own task.

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::network::protocol::{ServerResponse, TxsEnvelope};

/// Result of a server call.
pub type ServerResult = Result<ServerResponse, ServerError>;

/// Server call errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// Network failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with an error code.
    #[error("server rejected the request ({code}): {message}")]
    Rejected {
        /// Error code.
        code: i32,
        /// Human readable message.
        message: String,
    },

    /// Request never left the client (e.g. confirming an empty batch).
    #[error("logic server internal error")]
    InternalError,
}

/// Pending transaction endpoints of the game server.
pub trait TransactionServer: Send + Sync {
    /// Ask for every transaction pending for the current user.
    fn get_pending_transactions(&self) -> BoxFuture<'static, ServerResult>;

    /// Tell the server the given transactions are being applied. The response
    /// lists the transactions the server accepts.
    fn confirm_pending_transactions(&self, request: TxsEnvelope) -> BoxFuture<'static, ServerResult>;

    /// Confirm a single transaction.
    fn confirm_pending_transaction(&self, transaction: serde_json::Value) -> BoxFuture<'static, ServerResult> {
        self.confirm_pending_transactions(TxsEnvelope::new(vec![transaction]))
    }
}
