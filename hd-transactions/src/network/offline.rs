//! Offline Server
//!
//! In-process stand-in for the game server's pending transaction endpoints.
//! Used when playing without a backend and by the demo binary.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::debug;

use crate::network::client::{ServerError, ServerResult, TransactionServer};
use crate::network::protocol::{ServerResponse, TransactionDoc, TxsEnvelope};

#[derive(Debug, Default)]
struct OfflineState {
    pending: Vec<Value>,
    confirmed: BTreeSet<String>,
    fail_next: Option<ServerError>,
}

/// Pending transactions held in memory. Cloning shares the same store.
#[derive(Debug, Clone, Default)]
pub struct OfflineServer {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineServer {
    /// Empty server.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, OfflineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a transaction document for the user, e.g. a support grant.
    pub fn push_pending(&self, transaction: Value) {
        self.state().pending.push(transaction);
    }

    /// Number of transactions still pending.
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Ids confirmed so far.
    pub fn confirmed_ids(&self) -> Vec<String> {
        self.state().confirmed.iter().cloned().collect()
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: ServerError) {
        self.state().fail_next = Some(error);
    }

    fn respond(envelope: &TxsEnvelope) -> ServerResult {
        ServerResponse::new(envelope).map_err(|e| ServerError::Transport(e.to_string()))
    }
}

impl TransactionServer for OfflineServer {
    fn get_pending_transactions(&self) -> BoxFuture<'static, ServerResult> {
        let result = {
            let mut state = self.state();
            match state.fail_next.take() {
                Some(error) => Err(error),
                None => Self::respond(&TxsEnvelope::new(state.pending.clone())),
            }
        };
        async move { result }.boxed()
    }

    fn confirm_pending_transactions(&self, request: TxsEnvelope) -> BoxFuture<'static, ServerResult> {
        let result = {
            let mut state = self.state();
            if let Some(error) = state.fail_next.take() {
                Err(error)
            } else if request.is_empty() {
                Err(ServerError::InternalError)
            } else {
                let ids: BTreeSet<String> = request.ids().into_iter().collect();
                state.pending.retain(|tx| {
                    TransactionDoc::from_value(tx)
                        .ok()
                        .and_then(|doc| doc.id().map(str::to_owned))
                        .map_or(true, |id| !ids.contains(&id))
                });
                debug!("Offline server confirmed {} transactions", ids.len());
                state.confirmed.extend(ids);

                // The batch is echoed back as accepted
                Self::respond(&request)
            }
        };
        async move { result }.boxed()
    }
}
