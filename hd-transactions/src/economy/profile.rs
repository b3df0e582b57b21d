//! User Profile Store
//!
//! The slice of the user profile the transaction subsystem mutates: the
//! currency ledger, owned items, the queue of rewards waiting for the reward
//! flow, and the raw list of already-given transaction ids.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::core::currency::CurrencyKind;
use crate::core::reward::{EconomyGroup, Reward};

/// Mutable user profile. Implementations use interior mutability so the
/// profile can be shared between the manager and the rest of the game.
pub trait ProfileStore: Send + Sync {
    /// Credit currency to the ledger.
    fn earn_currency(&self, currency: CurrencyKind, amount: i64, economy_group: EconomyGroup);

    /// Grant one unit of an item.
    fn add_item(&self, sku: &str, item_type: &str, economy_group: EconomyGroup);

    /// Queue a reward to be granted by the reward flow later.
    fn push_reward(&self, reward: Reward);

    /// Raw `:`-separated list of given transaction ids.
    fn given_transactions(&self) -> Option<String>;

    /// Store the raw list of given transaction ids.
    fn set_given_transactions(&self, value: Option<String>);
}

/// A single ledger movement, kept for inspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Currency moved.
    pub currency: CurrencyKind,
    /// Amount credited.
    pub amount: i64,
    /// Attribution.
    pub economy_group: EconomyGroup,
}

#[derive(Debug, Default)]
struct ProfileData {
    balances: BTreeMap<CurrencyKind, i64>,
    ledger: Vec<LedgerEntry>,
    items: Vec<(String, String)>,
    reward_queue: VecDeque<Reward>,
    given_transactions: Option<String>,
}

/// Process-local profile.
#[derive(Debug, Default)]
pub struct InMemoryProfile {
    data: Mutex<ProfileData>,
}

impl InMemoryProfile {
    /// Create an empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> MutexGuard<'_, ProfileData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current balance of a currency.
    pub fn balance(&self, currency: CurrencyKind) -> i64 {
        self.data().balances.get(&currency).copied().unwrap_or(0)
    }

    /// Every credit applied so far, oldest first.
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.data().ledger.clone()
    }

    /// Owned items as (sku, type) pairs, in grant order.
    pub fn items(&self) -> Vec<(String, String)> {
        self.data().items.clone()
    }

    /// Rewards waiting for the reward flow, oldest first.
    pub fn queued_rewards(&self) -> Vec<Reward> {
        self.data().reward_queue.iter().cloned().collect()
    }

    /// Take the oldest queued reward and collect it into the ledger.
    pub fn collect_next_reward(&self) -> Option<Reward> {
        let reward = self.data().reward_queue.pop_front()?;
        reward.collect(self);
        Some(reward)
    }
}

impl ProfileStore for InMemoryProfile {
    fn earn_currency(&self, currency: CurrencyKind, amount: i64, economy_group: EconomyGroup) {
        let mut data = self.data();
        let balance = data.balances.entry(currency).or_insert(0);
        *balance = balance.saturating_add(amount);
        data.ledger.push(LedgerEntry {
            currency,
            amount,
            economy_group,
        });
    }

    fn add_item(&self, sku: &str, item_type: &str, _economy_group: EconomyGroup) {
        self.data().items.push((sku.to_string(), item_type.to_string()));
    }

    fn push_reward(&self, reward: Reward) {
        self.data().reward_queue.push_back(reward);
    }

    fn given_transactions(&self) -> Option<String> {
        self.data().given_transactions.clone()
    }

    fn set_given_transactions(&self, value: Option<String>) {
        self.data().given_transactions = value;
    }
}
