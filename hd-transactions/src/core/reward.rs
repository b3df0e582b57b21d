//! Rewards
//!
//! A reward is something grantable to the player: an amount of currency or
//! a discrete item (egg, pet, skin...). Every reward carries the economy group
//! it is attributed to for tracking.

use serde::{Serialize, Deserialize};

use crate::core::currency::CurrencyKind;
use crate::economy::profile::ProfileStore;

/// Source tag for purchases resumed through a pending transaction.
pub const SOURCE_SHOP: &str = "shop";
/// Source tag for grants issued by customer support.
pub const SOURCE_CRM: &str = "crm";

/// Why a reward was granted. Used for analytics, never for gameplay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[derive(Default)]
pub enum EconomyGroup {
    /// Unclassified.
    #[default]
    Unknown,
    /// Shop purchase that was interrupted and resumed later.
    ShopPurchaseResumed,
    /// Grant issued by customer support.
    CustomerSupport,
}

impl EconomyGroup {
    /// Economy group for a transaction source tag.
    pub fn from_source(source: Option<&str>) -> EconomyGroup {
        match source {
            Some(SOURCE_SHOP) => EconomyGroup::ShopPurchaseResumed,
            Some(SOURCE_CRM) => EconomyGroup::CustomerSupport,
            _ => EconomyGroup::Unknown,
        }
    }
}

/// What a reward grants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardKind {
    /// An amount of currency.
    Currency {
        /// Currency granted.
        currency: CurrencyKind,
        /// Amount granted.
        amount: i64,
    },
    /// A single unit of an item.
    Item {
        /// Item definition sku.
        sku: String,
        /// Item type code (`egg`, `pet`, `skin`...).
        item_type: String,
    },
}

/// A grantable reward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    /// What is granted.
    pub kind: RewardKind,
    /// Attribution.
    pub economy_group: EconomyGroup,
}

impl Reward {
    /// Currency reward.
    pub fn currency(currency: CurrencyKind, amount: i64, economy_group: EconomyGroup) -> Self {
        Self {
            kind: RewardKind::Currency { currency, amount },
            economy_group,
        }
    }

    /// Single-unit item reward.
    pub fn item(sku: impl Into<String>, item_type: impl Into<String>, economy_group: EconomyGroup) -> Self {
        Self {
            kind: RewardKind::Item {
                sku: sku.into(),
                item_type: item_type.into(),
            },
            economy_group,
        }
    }

    /// Currency and amount, if this is a currency reward.
    pub fn as_currency(&self) -> Option<(CurrencyKind, i64)> {
        match self.kind {
            RewardKind::Currency { currency, amount } => Some((currency, amount)),
            RewardKind::Item { .. } => None,
        }
    }

    /// Add to the amount of a currency reward. No-op for items.
    pub fn add_amount(&mut self, delta: i64) {
        if let RewardKind::Currency { ref mut amount, .. } = self.kind {
            *amount = amount.saturating_add(delta);
        }
    }

    /// Apply this reward to the user's ledger right away.
    pub fn collect(&self, profile: &dyn ProfileStore) {
        match &self.kind {
            RewardKind::Currency { currency, amount } => {
                profile.earn_currency(*currency, *amount, self.economy_group);
            }
            RewardKind::Item { sku, item_type } => {
                profile.add_item(sku, item_type, self.economy_group);
            }
        }
    }
}
