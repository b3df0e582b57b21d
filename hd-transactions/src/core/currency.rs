//! Currency Kinds
//!
//! Currencies a transaction can grant, and the keys the server uses for them.

use serde::{Serialize, Deserialize};

/// Key used by the server for soft currency (coins).
pub const KEY_SC: &str = "sc";
/// Key used by the server for hard currency (gems).
pub const KEY_HC: &str = "hc";
/// Key used by the server for golden egg fragments.
pub const KEY_GF: &str = "gf";
/// Placeholder key that never maps to a supported currency.
pub const KEY_NONE: &str = "none";

/// Every currency key scanned when parsing a transaction, in scan order.
pub const CURRENCY_KEYS: [&str; 4] = [KEY_NONE, KEY_SC, KEY_HC, KEY_GF];

/// Currency keys the server used for currencies that no longer exist.
/// A transaction carrying one can't be granted.
pub const LEGACY_CURRENCY_KEYS: [&str; 1] = ["pc"];

/// Most units a single item line may expand to.
pub const MAX_ITEM_UNITS: i64 = 1000;

/// Currency held in the user's ledger.
///
/// Implements Ord so rewards can live in a BTreeMap keyed by kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum CurrencyKind {
    /// Not a currency. Never grantable.
    #[default]
    None,
    /// Soft currency (coins).
    Soft,
    /// Hard currency (gems).
    Hard,
    /// Golden egg fragments.
    GoldenFragments,
}

impl CurrencyKind {
    /// Map a server key to a currency. Unknown keys map to `None`.
    pub fn from_key(key: &str) -> CurrencyKind {
        match key {
            KEY_SC => CurrencyKind::Soft,
            KEY_HC => CurrencyKind::Hard,
            KEY_GF => CurrencyKind::GoldenFragments,
            _ => CurrencyKind::None,
        }
    }

    /// Server key for this currency, if it has one.
    pub fn key(self) -> Option<&'static str> {
        match self {
            CurrencyKind::Soft => Some(KEY_SC),
            CurrencyKind::Hard => Some(KEY_HC),
            CurrencyKind::GoldenFragments => Some(KEY_GF),
            CurrencyKind::None => None,
        }
    }

    /// Whether this is a real, grantable currency.
    #[inline]
    pub fn is_some(self) -> bool {
        self != CurrencyKind::None
    }
}
