//! Pending Transaction Manager
//!
//! Periodically asks the server for transactions pending for this player
//! (mostly customer support grants and interrupted purchases), applies them
//! and tells the server they were applied.
//!
//! ```text
//! WaitingToRequest ──(timer expired, not in a run)──▶ WaitingForResponse
//! WaitingForResponse ──(valid transactions)──▶ WaitingForConfirmation
//! WaitingForResponse ──(none / error)──▶ WaitingToRequest
//! WaitingForConfirmation ──(any confirmation outcome)──▶ WaitingToRequest
//! ```
//!
//! Server calls are kept in flight inside the manager and only polled by the
//! task that owns it, so every state transition happens on that task.

use std::sync::Arc;
use std::time::Duration;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::core::happy_hour::GemsMultiplier;
use crate::economy::given::GivenTransactions;
use crate::economy::persistence::SaveRequester;
use crate::economy::profile::ProfileStore;
use crate::economy::settings::{FeatureSettings, GameFlow, ManagerConfig};
use crate::economy::transaction::{PerformType, Transaction};
use crate::network::client::{ServerResult, TransactionServer};
use crate::network::protocol::{parse_txs, TxsEnvelope};

/// Polling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Counting down to the next request.
    WaitingToRequest,
    /// Pending transactions requested.
    WaitingForResponse,
    /// Batch confirmation sent.
    WaitingForConfirmation,
}

/// Everything the manager talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Game server.
    pub server: Arc<dyn TransactionServer>,
    /// Current user's profile.
    pub profile: Arc<dyn ProfileStore>,
    /// Durable save trigger.
    pub persistence: Arc<dyn SaveRequester>,
    /// Device feature settings.
    pub features: Arc<dyn FeatureSettings>,
    /// Game flow, to avoid requesting during a run.
    pub flow: Arc<dyn GameFlow>,
    /// Happy hour applied to resumed purchases.
    pub gems: Arc<dyn GemsMultiplier>,
}

/// Reply of a server call, tagged with the request it answers.
#[derive(Debug)]
enum ServerReply {
    Pending(ServerResult),
    Confirmation(ServerResult),
}

/// Requests sent to a running manager through its handle.
#[derive(Debug)]
pub enum ManagerCommand {
    /// Request pending transactions as soon as possible.
    UrgeRequest,
    /// Debug only: restart the cycle and request right away.
    #[cfg(debug_assertions)]
    ForceRequest,
    /// Reload given transaction ids from the profile.
    GivenLoad,
    /// Record a transaction as already given.
    GivenAdd {
        /// Transaction id.
        id: String,
        /// Save the profile afterwards.
        save: bool,
    },
    /// Forget a given transaction.
    GivenRemove {
        /// Transaction id.
        id: String,
    },
    /// Ask the server whether it recognises a transaction.
    ConfirmTransaction {
        /// Transaction to confirm.
        transaction: Transaction,
        /// Where the answer goes.
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable handle to a manager running in [`TransactionManager::run`].
#[derive(Debug, Clone)]
pub struct TransactionManagerHandle {
    commands: mpsc::UnboundedSender<ManagerCommand>,
}

impl TransactionManagerHandle {
    fn send(&self, command: ManagerCommand) -> bool {
        if self.commands.send(command).is_err() {
            warn!("Transaction manager is not running");
            return false;
        }
        true
    }

    /// See [`TransactionManager::urge_request`].
    pub fn urge_request(&self) {
        self.send(ManagerCommand::UrgeRequest);
    }

    /// See [`TransactionManager::force_request`].
    #[cfg(debug_assertions)]
    pub fn force_request(&self) {
        self.send(ManagerCommand::ForceRequest);
    }

    /// See [`TransactionManager::given_load`].
    pub fn given_load(&self) {
        self.send(ManagerCommand::GivenLoad);
    }

    /// See [`TransactionManager::given_add`].
    pub fn given_add(&self, id: impl Into<String>, save: bool) {
        self.send(ManagerCommand::GivenAdd { id: id.into(), save });
    }

    /// See [`TransactionManager::given_remove`].
    pub fn given_remove(&self, id: impl Into<String>) {
        self.send(ManagerCommand::GivenRemove { id: id.into() });
    }

    /// See [`TransactionManager::confirm_transaction_with_server`].
    pub async fn confirm_transaction_with_server(&self, transaction: Transaction) -> bool {
        let (reply, answer) = oneshot::channel();
        if !self.send(ManagerCommand::ConfirmTransaction { transaction, reply }) {
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

/// Pending transaction manager.
pub struct TransactionManager {
    config: ManagerConfig,
    deps: Collaborators,
    state: PendingState,
    time_to_request: Duration,
    pending: Vec<Transaction>,
    given: GivenTransactions,
    in_flight: FuturesUnordered<BoxFuture<'static, ServerReply>>,
    commands_tx: mpsc::UnboundedSender<ManagerCommand>,
    commands_rx: mpsc::UnboundedReceiver<ManagerCommand>,
}

impl TransactionManager {
    /// Create a manager ready to request on its first update.
    pub fn new(config: ManagerConfig, deps: Collaborators) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let mut manager = Self {
            config,
            deps,
            state: PendingState::WaitingToRequest,
            time_to_request: Duration::ZERO,
            pending: Vec::new(),
            given: GivenTransactions::new(),
            in_flight: FuturesUnordered::new(),
            commands_tx,
            commands_rx,
        };
        manager.reset();
        manager
    }

    /// Handle for other tasks to talk to the manager once it runs.
    pub fn handle(&self) -> TransactionManagerHandle {
        TransactionManagerHandle {
            commands: self.commands_tx.clone(),
        }
    }

    /// Back to the initial state. Replies still in flight are dropped.
    pub fn reset(&mut self) {
        self.pending_reset();
        self.given.reset();
    }

    fn pending_reset(&mut self) {
        self.set_state(PendingState::WaitingToRequest);

        // Pending transactions are requested right after launch so the user
        // gets a support grant as soon as they are told about it
        self.time_to_request = Duration::ZERO;

        self.pending.clear();
        self.in_flight = FuturesUnordered::new();
    }

    /// Current polling state.
    pub fn state(&self) -> PendingState {
        self.state
    }

    /// Time left before the next request is allowed.
    pub fn time_to_request(&self) -> Duration {
        self.time_to_request
    }

    /// Transactions received and not applied yet.
    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    /// Already-given transaction ids.
    pub fn given(&self) -> &GivenTransactions {
        &self.given
    }

    /// Whether a server call is waiting for its reply.
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    fn set_state(&mut self, state: PendingState) {
        self.state = state;
        if state == PendingState::WaitingToRequest {
            self.time_to_request = self.config.poll_interval;
        }
    }

    /// Advance the polling timer by `delta`. Call once per scheduler cycle.
    pub fn update(&mut self, delta: Duration) {
        if self.state != PendingState::WaitingToRequest {
            return;
        }

        self.time_to_request = self.time_to_request.saturating_sub(delta);

        // Never in the middle of a run
        if self.time_to_request.is_zero() && !self.deps.flow.is_in_game_scene() {
            self.request_transactions();
        }
    }

    /// Debug only: restart the cycle and request on the next update.
    #[cfg(debug_assertions)]
    pub fn force_request(&mut self) {
        self.set_state(PendingState::WaitingToRequest);
        self.time_to_request = Duration::ZERO;
    }

    /// Request on the next update if waiting, e.g. after a purchase from a
    /// previous session has been resumed.
    pub fn urge_request(&mut self) {
        self.time_to_request = Duration::ZERO;
    }

    fn request_transactions(&mut self) {
        info!("Requesting pending transactions...");

        let request = self.deps.server.get_pending_transactions();
        self.in_flight.push(request.map(ServerReply::Pending).boxed());
        self.set_state(PendingState::WaitingForResponse);
    }

    /// Wait for the next server reply and process it. Returns `false` if
    /// nothing was in flight.
    pub async fn next_reply(&mut self) -> bool {
        match self.in_flight.next().await {
            Some(reply) => {
                self.handle_reply(reply);
                true
            }
            None => false,
        }
    }

    fn handle_reply(&mut self, reply: ServerReply) {
        match reply {
            ServerReply::Pending(result) => self.on_transactions_response(result),
            ServerReply::Confirmation(result) => self.on_confirm_response(result),
        }
    }

    fn parse_transaction(&self, json: &Value) -> Transaction {
        let mut transaction = Transaction::new();
        transaction.from_json_with(json, self.deps.gems.as_ref());
        transaction
    }

    fn on_transactions_response(&mut self, result: ServerResult) {
        // The server holds every pending transaction for this user, nothing
        // is carried over from the previous response
        self.pending.clear();

        #[cfg(feature = "debug-tracing")]
        debug!("OnPendingTransactionResponse: {:?}", result);

        match parse_txs(result) {
            Ok(txs) => {
                for json in &txs {
                    let transaction = self.parse_transaction(json);
                    if transaction.can_perform() {
                        self.pending.push(transaction);
                    } else {
                        error!(
                            "Transaction {} received from the server is not supported by the client so it's ignored",
                            json
                        );
                    }
                }
            }
            Err(e) => {
                warn!("Error when requesting pending transactions: {}", e);
            }
        }

        if self.pending.is_empty() {
            self.set_state(PendingState::WaitingToRequest);
            return;
        }

        debug!("{} pending transactions received", self.pending.len());
        self.set_state(PendingState::WaitingForConfirmation);

        let request = TxsEnvelope::new(self.pending.iter().map(Transaction::to_json).collect());
        let confirmation = self.deps.server.confirm_pending_transactions(request);
        self.in_flight.push(confirmation.map(ServerReply::Confirmation).boxed());

        if !self.deps.features.need_pending_transactions_server_confirm() {
            // Rewards go out now; the confirmation outcome is not waited for
            let mut pending = std::mem::take(&mut self.pending);
            for transaction in pending.iter_mut() {
                self.perform_pending(transaction);
            }
        }
    }

    fn on_confirm_response(&mut self, result: ServerResult) {
        if self.deps.features.need_pending_transactions_server_confirm() {
            match parse_txs(result) {
                Ok(txs) => {
                    for json in &txs {
                        let mut transaction = self.parse_transaction(json);
                        self.perform_pending(&mut transaction);
                    }
                }
                Err(e) => {
                    warn!("Error when confirming pending transactions: {}", e);
                }
            }
        }

        self.set_state(PendingState::WaitingToRequest);
        self.pending.clear();
    }

    fn perform_pending(&mut self, transaction: &mut Transaction) {
        // Makes sure the transaction hasn't already been given by the shop
        if let Some(id) = transaction.id().filter(|id| self.given.contains(id)) {
            info!(
                "Transaction with id {} is not performed because it had already been performed",
                id
            );
            let id = id.to_string();
            self.given_remove(&id);
        } else if transaction.can_perform() {
            transaction.perform(
                PerformType::AddToUserProfile,
                self.deps.profile.as_ref(),
                self.deps.persistence.as_ref(),
            );
        }
    }

    /// Ask the server whether it recognises `transaction`. Resolves to `true`
    /// iff the confirmation response lists a transaction with the same id.
    /// Errors resolve to `false`. Does not touch the polling state.
    pub fn confirm_transaction_with_server(&self, transaction: &Transaction) -> BoxFuture<'static, bool> {
        let Some(id) = transaction.id().map(str::to_owned) else {
            return async { false }.boxed();
        };

        let request = self.deps.server.confirm_pending_transaction(transaction.to_json());
        async move {
            match parse_txs(request.await) {
                Ok(txs) => txs.iter().any(|json| {
                    let mut confirmed = Transaction::new();
                    confirmed.from_json(json);
                    confirmed.id() == Some(id.as_str())
                }),
                Err(e) => {
                    warn!("Error when confirming transaction {}: {}", id, e);
                    false
                }
            }
        }
        .boxed()
    }

    /// Load given transaction ids stored in the profile.
    pub fn given_load(&mut self) {
        self.given.load(self.deps.profile.as_ref());
    }

    /// Record a transaction as already given.
    pub fn given_add(&mut self, id: &str, save: bool) {
        self.given.add(id, save, self.deps.profile.as_ref(), self.deps.persistence.as_ref());
    }

    /// Forget a given transaction.
    pub fn given_remove(&mut self, id: &str) {
        self.given.remove(id, self.deps.profile.as_ref(), self.deps.persistence.as_ref());
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::UrgeRequest => self.urge_request(),
            #[cfg(debug_assertions)]
            ManagerCommand::ForceRequest => self.force_request(),
            ManagerCommand::GivenLoad => self.given_load(),
            ManagerCommand::GivenAdd { id, save } => self.given_add(&id, save),
            ManagerCommand::GivenRemove { id } => self.given_remove(&id),
            ManagerCommand::ConfirmTransaction { transaction, reply } => {
                let query = self.confirm_transaction_with_server(&transaction);
                tokio::spawn(async move {
                    let _ = reply.send(query.await);
                });
            }
        }
    }

    /// Drive the manager until `shutdown` fires: updates every
    /// `tick_interval`, processes server replies and handle commands.
    #[instrument(skip_all)]
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Transaction manager started");

        loop {
            let event = tokio::select! {
                _ = ticker.tick() => LoopEvent::Tick,
                Some(reply) = self.in_flight.next(), if !self.in_flight.is_empty() => LoopEvent::Reply(reply),
                Some(command) = self.commands_rx.recv() => LoopEvent::Command(command),
                _ = shutdown.recv() => LoopEvent::Shutdown,
            };

            match event {
                LoopEvent::Tick => {
                    let now = Instant::now();
                    self.update(now.duration_since(last_tick));
                    last_tick = now;
                }
                LoopEvent::Reply(reply) => self.handle_reply(reply),
                LoopEvent::Command(command) => self.handle_command(command),
                LoopEvent::Shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }
}

enum LoopEvent {
    Tick,
    Reply(ServerReply),
    Command(ManagerCommand),
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use chrono::Utc;
    use serde_json::json;

    use crate::core::currency::CurrencyKind;
    use crate::core::happy_hour::{HappyHour, NoHappyHour};
    use crate::economy::persistence::SaveCounter;
    use crate::economy::profile::InMemoryProfile;
    use crate::economy::settings::{FeatureFlags, SceneFlag};
    use crate::network::client::ServerError;
    use crate::network::offline::OfflineServer;
    use crate::network::protocol::ServerResponse;

    /// Server answering from scripted queues. Confirmations echo the request
    /// when nothing is scripted.
    #[derive(Default)]
    struct ScriptedServer {
        get_replies: Mutex<VecDeque<ServerResult>>,
        confirm_replies: Mutex<VecDeque<ServerResult>>,
        get_calls: AtomicUsize,
        confirm_requests: Mutex<Vec<TxsEnvelope>>,
    }

    impl ScriptedServer {
        fn reply_get(&self, reply: ServerResult) {
            self.get_replies.lock().unwrap().push_back(reply);
        }

        fn reply_confirm(&self, reply: ServerResult) {
            self.confirm_replies.lock().unwrap().push_back(reply);
        }

        fn get_calls(&self) -> usize {
            self.get_calls.load(Ordering::SeqCst)
        }

        fn confirm_requests(&self) -> Vec<TxsEnvelope> {
            self.confirm_requests.lock().unwrap().clone()
        }
    }

    impl TransactionServer for ScriptedServer {
        fn get_pending_transactions(&self) -> BoxFuture<'static, ServerResult> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .get_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ServerResponse::new(&TxsEnvelope::default()).map_err(|_| ServerError::InternalError));
            async move { reply }.boxed()
        }

        fn confirm_pending_transactions(&self, request: TxsEnvelope) -> BoxFuture<'static, ServerResult> {
            self.confirm_requests.lock().unwrap().push(request.clone());
            let reply = self
                .confirm_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ServerResponse::new(&request).map_err(|_| ServerError::InternalError));
            async move { reply }.boxed()
        }
    }

    fn txs(entries: Value) -> ServerResult {
        Ok(ServerResponse::new(&json!({ "txs": entries })).unwrap())
    }

    struct Harness {
        manager: TransactionManager,
        server: Arc<ScriptedServer>,
        profile: Arc<InMemoryProfile>,
        saves: Arc<SaveCounter>,
        scene: Arc<SceneFlag>,
    }

    fn harness(server_confirm: bool) -> Harness {
        harness_with_gems(server_confirm, Arc::new(NoHappyHour))
    }

    fn harness_with_gems(server_confirm: bool, gems: Arc<dyn GemsMultiplier>) -> Harness {
        let server = Arc::new(ScriptedServer::default());
        let profile = Arc::new(InMemoryProfile::new());
        let saves = Arc::new(SaveCounter::new());
        let scene = Arc::new(SceneFlag::new());
        let deps = Collaborators {
            server: server.clone(),
            profile: profile.clone(),
            persistence: saves.clone(),
            features: Arc::new(FeatureFlags {
                pending_transactions_server_confirm: server_confirm,
            }),
            flow: scene.clone(),
            gems,
        };

        Harness {
            manager: TransactionManager::new(ManagerConfig::default(), deps),
            server,
            profile,
            saves,
            scene,
        }
    }

    fn support_grant(id: &str, sc: i64) -> Value {
        json!({ "order_id": id, "source": "crm", "sc": sc.to_string() })
    }

    #[test]
    fn test_initial_state() {
        let h = harness(true);
        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert_eq!(h.manager.time_to_request(), Duration::ZERO);
        assert!(h.manager.pending_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_first_update_requests_immediately() {
        let mut h = harness(true);
        h.manager.update(Duration::ZERO);

        assert_eq!(h.manager.state(), PendingState::WaitingForResponse);
        assert_eq!(h.server.get_calls(), 1);

        // No second request while one is in flight
        h.manager.update(Duration::from_secs(3600));
        assert_eq!(h.server.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_request_during_run() {
        let mut h = harness(true);
        h.scene.set_in_game(true);
        h.manager.update(Duration::from_secs(1));
        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert_eq!(h.server.get_calls(), 0);

        h.scene.set_in_game(false);
        h.manager.update(Duration::ZERO);
        assert_eq!(h.manager.state(), PendingState::WaitingForResponse);
    }

    #[tokio::test]
    async fn test_empty_response_back_to_waiting() {
        let mut h = harness(true);
        h.server.reply_get(txs(json!([])));

        h.manager.update(Duration::ZERO);
        assert!(h.manager.next_reply().await);

        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert_eq!(h.manager.time_to_request(), Duration::from_secs(600));
        assert!(h.server.confirm_requests().is_empty());
        assert!(!h.manager.has_in_flight());
    }

    #[tokio::test]
    async fn test_error_response_back_to_waiting() {
        let mut h = harness(true);
        h.server.reply_get(Err(ServerError::Transport("no network".into())));

        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;

        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert!(h.server.confirm_requests().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_response_back_to_waiting() {
        let mut h = harness(true);
        h.server.reply_get(Ok(ServerResponse { response: Some("<html>".into()) }));

        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;

        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
    }

    #[tokio::test]
    async fn test_invalid_entries_dropped() {
        let mut h = harness(true);
        h.server.reply_get(txs(json!([
            support_grant("1", 100),
            { "order_id": "2", "source": "crm", "pc": "5" },
            "garbage"
        ])));

        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;

        assert_eq!(h.manager.state(), PendingState::WaitingForConfirmation);
        assert_eq!(h.manager.pending_transactions().len(), 1);

        let requests = h.server.confirm_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].ids(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_confirmation_required_waits_for_server() {
        let mut h = harness(true);
        h.server.reply_get(txs(json!([support_grant("1", 100)])));

        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;

        // Confirmation is in flight, nothing granted yet
        assert_eq!(h.manager.state(), PendingState::WaitingForConfirmation);
        assert!(h.profile.queued_rewards().is_empty());
        assert!(!h.manager.pending_transactions()[0].has_been_performed());

        h.manager.next_reply().await;

        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert!(h.manager.pending_transactions().is_empty());
        let queued = h.profile.queued_rewards();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].as_currency(), Some((CurrencyKind::Soft, 100)));
        assert_eq!(h.saves.count(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_required_grants_only_confirmed() {
        let mut h = harness(true);
        h.server.reply_get(txs(json!([support_grant("1", 100), support_grant("2", 200)])));
        h.server.reply_confirm(txs(json!([support_grant("2", 200)])));

        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;
        h.manager.next_reply().await;

        let queued = h.profile.queued_rewards();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].as_currency(), Some((CurrencyKind::Soft, 200)));
    }

    #[tokio::test]
    async fn test_confirmation_error_grants_nothing() {
        let mut h = harness(true);
        h.server.reply_get(txs(json!([support_grant("1", 100)])));
        h.server.reply_confirm(Err(ServerError::Rejected {
            code: 500,
            message: "boom".into(),
        }));

        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;
        h.manager.next_reply().await;

        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert!(h.profile.queued_rewards().is_empty());
        assert!(h.manager.pending_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_not_required_grants_immediately() {
        let mut h = harness(false);
        h.server.reply_get(txs(json!([support_grant("1", 100), support_grant("2", 50)])));

        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;

        // Granted before the confirmation reply is processed
        assert_eq!(h.manager.state(), PendingState::WaitingForConfirmation);
        assert!(h.manager.pending_transactions().is_empty());
        assert_eq!(h.profile.queued_rewards().len(), 2);
        assert_eq!(h.server.confirm_requests().len(), 1);

        h.manager.next_reply().await;

        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert_eq!(h.profile.queued_rewards().len(), 2);
    }

    #[tokio::test]
    async fn test_confirmation_not_required_ignores_confirm_failure() {
        let mut h = harness(false);
        h.server.reply_get(txs(json!([support_grant("1", 100)])));
        h.server.reply_confirm(Err(ServerError::Transport("lost".into())));

        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;
        h.manager.next_reply().await;

        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert_eq!(h.profile.queued_rewards().len(), 1);
    }

    #[tokio::test]
    async fn test_happy_hour_applied_once_to_resumed_purchase() {
        let offer = HappyHour::new(0.5, Utc::now() + chrono::Duration::hours(1));
        let mut h = harness_with_gems(true, Arc::new(offer));
        h.server.reply_get(txs(json!([
            { "order_id": "gp-1", "source": "shop", "product_id": "gems_pack_2", "hc": "100", "sc": "10" },
            { "order_id": "cs-1", "source": "crm", "hc": "100" }
        ])));

        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;

        // The batch sent for confirmation already carries the extra gems
        let requests = h.server.confirm_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].txs[0]["hc"], json!("150"));
        assert!(requests[0].txs[0].get("product_id").is_none());
        assert_eq!(requests[0].txs[1]["hc"], json!("100"));
        assert!(h.profile.queued_rewards().is_empty());

        // Echo comes back and is granted without a second multiplier
        h.manager.next_reply().await;

        let queued: Vec<(CurrencyKind, i64)> = h
            .profile
            .queued_rewards()
            .iter()
            .filter_map(|reward| reward.as_currency())
            .collect();
        assert_eq!(
            queued,
            vec![(CurrencyKind::Soft, 10), (CurrencyKind::Hard, 150), (CurrencyKind::Hard, 100)]
        );
    }

    #[tokio::test]
    async fn test_timer_rearms_after_cycle() {
        let mut h = harness(true);
        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;
        assert_eq!(h.server.get_calls(), 1);

        h.manager.update(Duration::from_secs(599));
        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert_eq!(h.server.get_calls(), 1);

        h.manager.update(Duration::from_secs(1));
        assert_eq!(h.manager.state(), PendingState::WaitingForResponse);
        assert_eq!(h.server.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_urge_request() {
        let mut h = harness(true);
        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;
        assert_eq!(h.manager.time_to_request(), Duration::from_secs(600));

        h.manager.urge_request();
        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        h.manager.update(Duration::ZERO);
        assert_eq!(h.server.get_calls(), 2);
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    async fn test_force_request() {
        let mut h = harness(true);
        h.server.reply_get(txs(json!([support_grant("1", 100)])));
        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;
        assert_eq!(h.manager.state(), PendingState::WaitingForConfirmation);

        h.manager.force_request();
        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert_eq!(h.manager.time_to_request(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_reset_drops_in_flight() {
        let mut h = harness(true);
        h.manager.update(Duration::ZERO);
        assert!(h.manager.has_in_flight());

        h.manager.reset();
        assert!(!h.manager.has_in_flight());
        assert!(!h.manager.next_reply().await);
        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert_eq!(h.manager.time_to_request(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_given_transaction_not_granted_twice() {
        let mut h = harness(false);
        h.manager.given_add("gp-1", true);
        assert_eq!(h.saves.count(), 1);

        h.server.reply_get(txs(json!([
            { "order_id": "gp-1", "source": "shop", "hc": "100" },
            support_grant("2", 10)
        ])));
        h.manager.update(Duration::ZERO);
        h.manager.next_reply().await;

        let queued = h.profile.queued_rewards();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].as_currency(), Some((CurrencyKind::Soft, 10)));
        assert!(!h.manager.given().contains("gp-1"));
        assert_eq!(h.profile.given_transactions(), None);
    }

    #[tokio::test]
    async fn test_given_load() {
        let mut h = harness(true);
        h.profile.set_given_transactions(Some("a:b".into()));
        h.manager.given_load();
        assert!(h.manager.given().contains("a"));
        assert!(h.manager.given().contains("b"));

        h.manager.reset();
        assert!(h.manager.given().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_transaction_with_server() {
        let h = harness(true);
        let mut transaction = Transaction::new();
        transaction.set_id("gp-7");
        transaction.set_source("shop");

        // Echoed back: recognised
        assert!(h.manager.confirm_transaction_with_server(&transaction).await);

        h.server.reply_confirm(txs(json!([support_grant("other", 1)])));
        assert!(!h.manager.confirm_transaction_with_server(&transaction).await);

        h.server.reply_confirm(Err(ServerError::InternalError));
        assert!(!h.manager.confirm_transaction_with_server(&transaction).await);

        // Query only, the polling state is untouched
        assert_eq!(h.manager.state(), PendingState::WaitingToRequest);
        assert!(!h.manager.has_in_flight());
    }

    #[tokio::test]
    async fn test_confirm_transaction_without_id() {
        let h = harness(true);
        assert!(!h.manager.confirm_transaction_with_server(&Transaction::new()).await);
        assert!(h.server.confirm_requests().is_empty());
    }

    #[tokio::test]
    async fn test_run_loop_with_offline_server() {
        let server = OfflineServer::new();
        server.push_pending(support_grant("cs-1", 500));

        let profile = Arc::new(InMemoryProfile::new());
        let deps = Collaborators {
            server: Arc::new(server.clone()),
            profile: profile.clone(),
            persistence: Arc::new(SaveCounter::new()),
            features: Arc::new(FeatureFlags::default()),
            flow: Arc::new(SceneFlag::new()),
            gems: Arc::new(NoHappyHour),
        };
        let config = ManagerConfig {
            tick_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let manager = TransactionManager::new(config, deps);
        let handle = manager.handle();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(manager.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while profile.queued_rewards().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pending grant was not applied");

        assert_eq!(profile.queued_rewards()[0].as_currency(), Some((CurrencyKind::Soft, 500)));
        assert_eq!(server.pending_count(), 0);
        assert_eq!(server.confirmed_ids(), vec!["cs-1".to_string()]);

        let mut purchase = Transaction::new();
        purchase.set_id("gp-2");
        assert!(handle.confirm_transaction_with_server(purchase).await);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        // Manager gone
        let mut late = Transaction::new();
        late.set_id("gp-3");
        assert!(!handle.confirm_transaction_with_server(late).await);
    }
}
