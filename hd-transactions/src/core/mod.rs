//! Core economy primitives.
//!
//! Value types shared by transactions and the pending manager. Nothing in
//! this module touches the network or the user profile on its own.

pub mod currency;
pub mod happy_hour;
pub mod reward;
pub mod safe_parse;

// Re-export core types
pub use currency::{CurrencyKind, CURRENCY_KEYS, LEGACY_CURRENCY_KEYS, MAX_ITEM_UNITS};
pub use happy_hour::{GemsMultiplier, HappyHour, NoHappyHour};
pub use reward::{EconomyGroup, Reward, RewardKind};
pub use safe_parse::{safe_parse_amount, safe_parse_int};
