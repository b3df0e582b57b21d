//! Network Layer
//!
//! Talks to the game server's pending transaction endpoints and runs the
//! polling manager that applies what it returns.
//!
//! ## Module Structure
//!
//! - `protocol`: Wire documents (`{ "txs": [...] }`, transaction entries)
//! - `client`: Server trait and error type
//! - `offline`: In-process server used without a backend
//! - `manager`: Polling, confirmation and application of pending transactions

pub mod client;
pub mod manager;
pub mod offline;
pub mod protocol;

pub use client::{ServerError, ServerResult, TransactionServer};
pub use manager::{
    Collaborators, ManagerCommand, PendingState, TransactionManager, TransactionManagerHandle,
};
pub use offline::OfflineServer;
pub use protocol::{parse_txs, ItemDoc, ResponseError, ServerResponse, TransactionDoc, TxsEnvelope};
