//! Transactions
//!
//! A transaction is the way the server adds something to the user's profile:
//! currencies and/or items. It is parsed from an untrusted document, then
//! performed exactly once.

use std::collections::BTreeMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::currency::{CurrencyKind, CURRENCY_KEYS, MAX_ITEM_UNITS};
use crate::core::happy_hour::{GemsMultiplier, NoHappyHour};
use crate::core::reward::{EconomyGroup, Reward};
use crate::core::safe_parse::safe_parse_amount;
use crate::economy::persistence::SaveRequester;
use crate::economy::profile::ProfileStore;
use crate::network::protocol::{ItemDoc, TransactionDoc};

/// How a transaction's rewards reach the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformType {
    /// Rewards are applied to the ledger immediately.
    Direct,
    /// Rewards are queued in the profile and granted when the reward flow
    /// runs, typically on the dragon selection screen.
    AddToUserProfile,
}

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// Fields loaded, rewards not applied yet.
    #[default]
    Parsed,
    /// Rewards applied. Terminal.
    Performed,
}

/// One unit of an item reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRewardEntry {
    /// Item sku.
    pub sku: String,
    /// Item type code.
    pub item_type: String,
    /// Units in this entry. Always 1 once expanded.
    pub amount: i64,
    /// Materialized reward.
    pub reward: Reward,
}

/// A server-issued grant.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    id: Option<String>,
    source: Option<String>,
    action: Option<String>,
    currency_rewards: BTreeMap<CurrencyKind, Reward>,
    item_rewards: Vec<ItemRewardEntry>,
    is_valid: bool,
    state: TransactionState,
}

impl Transaction {
    /// Create an empty, invalid transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Server id.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Set the server id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Origin tag.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Set the origin tag.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
    }

    /// Confirmation token.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Lifecycle state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether the document had only supported currencies.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Whether rewards were already applied.
    pub fn has_been_performed(&self) -> bool {
        self.state == TransactionState::Performed
    }

    /// Economy group rewards are attributed to.
    pub fn economy_group(&self) -> EconomyGroup {
        EconomyGroup::from_source(self.source())
    }

    /// Clear every field.
    pub fn reset(&mut self) {
        self.id = None;
        self.source = None;
        self.action = None;
        self.currency_rewards.clear();
        self.item_rewards.clear();
        self.is_valid = false;
        self.state = TransactionState::Parsed;
    }

    /// Load from a document without any promotion applied.
    ///
    /// Returns whether the transaction can be performed.
    pub fn from_json(&mut self, json: &Value) -> bool {
        self.from_json_with(json, &NoHappyHour)
    }

    /// Load from a document. Hard currency of resumed purchases goes through
    /// `gems` so the player gets the happy hour they bought under.
    ///
    /// Returns whether the transaction can be performed.
    pub fn from_json_with(&mut self, json: &Value, gems: &dyn GemsMultiplier) -> bool {
        // Example { "order_id":"1", "source":"crm", "hc":"1", "sc":"100" }
        self.reset();

        let doc = match TransactionDoc::from_value(json) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Transaction document rejected: {}", e);
                return self.can_perform();
            }
        };

        self.id = doc.id().map(str::to_owned);
        self.source = doc.source.clone();
        self.action = doc.action.clone();

        let resumed_purchase = doc.is_resumed_purchase();
        let economy_group = self.economy_group();
        let mut is_valid = true;

        for key in CURRENCY_KEYS {
            let Some(raw) = doc.currency_field(key) else {
                continue;
            };

            let currency = CurrencyKind::from_key(key);
            if !currency.is_some() {
                warn!("Resource not supported: {}", key);
                is_valid = false;
                continue;
            }

            let mut amount = safe_parse_amount(raw);
            if amount <= 0 {
                // Grants only ever credit the player
                debug!("Ignoring non-positive amount {} for {}", amount, key);
                continue;
            }
            if resumed_purchase && currency == CurrencyKind::Hard {
                amount = gems.apply_extra_gems(amount);
            }
            self.add_currency(currency, amount, economy_group);
        }

        for key in doc.unrecognized_currency_keys() {
            warn!("Resource not supported: {}", key);
            is_valid = false;
        }

        if let Some(items) = &doc.items {
            for item in items {
                if !self.add_item_units(item, economy_group) {
                    is_valid = false;
                }
            }
        }

        self.is_valid = is_valid;
        self.can_perform()
    }

    /// Add currency, summing with any amount already held for that kind.
    pub fn add_currency(&mut self, currency: CurrencyKind, amount: i64, economy_group: EconomyGroup) {
        self.currency_rewards
            .entry(currency)
            .and_modify(|reward| reward.add_amount(amount))
            .or_insert_with(|| Reward::currency(currency, amount, economy_group));
    }

    /// Expand an item line into single-unit rewards.
    ///
    /// Multi-unit rewards aren't granted correctly by the reward flow, so a
    /// line of `n` units becomes `n` entries of one unit each. Returns `false`
    /// for a line above [`MAX_ITEM_UNITS`], which is not expanded.
    fn add_item_units(&mut self, item: &ItemDoc, economy_group: EconomyGroup) -> bool {
        let amount = item.amount.as_ref().map(safe_parse_amount).unwrap_or(0);
        if amount <= 0 {
            return true;
        }
        if amount > MAX_ITEM_UNITS {
            warn!(
                "Item {:?} amount {} is above the {} units limit",
                item.sku, amount, MAX_ITEM_UNITS
            );
            return false;
        }

        let sku = item.sku.clone().unwrap_or_default();
        let item_type = item.item_type.clone().unwrap_or_default();
        for _ in 0..amount {
            self.item_rewards.push(ItemRewardEntry {
                sku: sku.clone(),
                item_type: item_type.clone(),
                amount: 1,
                reward: Reward::item(sku.clone(), item_type.clone(), economy_group),
            });
        }
        true
    }

    /// Durable/log form. Never carries `product_id`, so a re-parse does not
    /// apply the happy hour a second time.
    pub fn to_doc(&self) -> TransactionDoc {
        let mut doc = TransactionDoc {
            order_id: Some(self.id.clone().unwrap_or_default()),
            source: Some(self.source.clone().unwrap_or_default()),
            action: self.action.clone().filter(|a| !a.is_empty()),
            ..Default::default()
        };

        for (currency, reward) in &self.currency_rewards {
            let (Some(key), Some((_, amount))) = (currency.key(), reward.as_currency()) else {
                debug!("Not supported currency: {:?}", currency);
                continue;
            };
            if let Some(slot) = doc.currency_slot(key) {
                *slot = Some(Value::String(amount.to_string()));
            }
        }

        if !self.item_rewards.is_empty() {
            doc.items = Some(
                self.item_rewards
                    .iter()
                    .map(|entry| ItemDoc {
                        sku: Some(entry.sku.clone()),
                        item_type: Some(entry.item_type.clone()),
                        amount: Some(Value::String(entry.amount.to_string())),
                    })
                    .collect(),
            );
        }

        doc
    }

    /// Durable/log form as JSON.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.to_doc()).unwrap_or(Value::Null)
    }

    /// Whether `perform` would apply anything.
    pub fn can_perform(&self) -> bool {
        self.is_valid && self.state == TransactionState::Parsed
    }

    /// Apply the rewards once. Returns `false`, doing nothing, if the
    /// transaction is invalid or was already performed.
    pub fn perform(
        &mut self,
        perform_type: PerformType,
        profile: &dyn ProfileStore,
        persistence: &dyn SaveRequester,
    ) -> bool {
        if !self.can_perform() {
            debug!("Transaction {:?} can't be performed", self.id);
            return false;
        }

        match perform_type {
            PerformType::Direct => self.perform_direct(profile),
            PerformType::AddToUserProfile => self.add_to_user_profile(profile, persistence),
        }

        self.state = TransactionState::Performed;
        true
    }

    fn perform_direct(&self, profile: &dyn ProfileStore) {
        for reward in self.to_rewards() {
            reward.collect(profile);
        }
    }

    fn add_to_user_profile(&self, profile: &dyn ProfileStore, persistence: &dyn SaveRequester) {
        for reward in self.to_rewards() {
            profile.push_reward(reward);
        }

        // The rewards are only granted when the reward flow runs, save now so
        // they survive the game being closed before that.
        persistence.request_save();
    }

    /// Every reward: currencies first, then item units in parse order.
    pub fn to_rewards(&self) -> Vec<Reward> {
        self.currency_rewards
            .values()
            .cloned()
            .chain(self.item_rewards.iter().map(|entry| entry.reward.clone()))
            .collect()
    }

    /// Amount granted of a currency.
    pub fn currency_amount(&self, currency: CurrencyKind) -> i64 {
        self.currency_rewards
            .get(&currency)
            .and_then(Reward::as_currency)
            .map(|(_, amount)| amount)
            .unwrap_or(0)
    }

    /// Number of distinct currencies granted.
    pub fn resource_types_amount(&self) -> usize {
        self.currency_rewards.len()
    }

    /// Item units, in parse order.
    pub fn item_rewards(&self) -> &[ItemRewardEntry] {
        &self.item_rewards
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.source == other.source
            && self.currency_rewards == other.currency_rewards
            && self.item_rewards == other.item_rewards
    }
}
