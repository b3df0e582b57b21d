//! Happy Hour
//!
//! Time-limited offer granting extra gems on hard currency packs. The server
//! does not know about it, so purchases resumed through a pending transaction
//! get the extra gems applied on the client.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Transforms a hard currency amount according to active promotions.
pub trait GemsMultiplier: Send + Sync {
    /// Amount of gems the player should receive for a pack of `amount` gems.
    fn apply_extra_gems(&self, amount: i64) -> i64;
}

/// No promotion running. Amounts pass through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHappyHour;

impl GemsMultiplier for NoHappyHour {
    fn apply_extra_gems(&self, amount: i64) -> i64 {
        amount
    }
}

/// An active or expired happy hour offer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HappyHour {
    /// Extra gems as a fraction of the pack (0.25 = +25%).
    pub extra_gems_factor: f64,
    /// When the offer ends.
    pub expiration_time: DateTime<Utc>,
}

impl HappyHour {
    /// Create an offer.
    pub fn new(extra_gems_factor: f64, expiration_time: DateTime<Utc>) -> Self {
        Self {
            extra_gems_factor,
            expiration_time,
        }
    }

    /// Whether the offer is running at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time > now && self.extra_gems_factor > 0.0
    }

    /// Apply the multiplier at `now`. Expired offers leave the amount untouched.
    ///
    /// Rounds half to even.
    pub fn apply_at(&self, amount: i64, now: DateTime<Utc>) -> i64 {
        if !self.is_active_at(now) {
            return amount;
        }
        (amount as f64 * (1.0 + self.extra_gems_factor)).round_ties_even() as i64
    }
}

impl GemsMultiplier for HappyHour {
    fn apply_extra_gems(&self, amount: i64) -> i64 {
        self.apply_at(amount, Utc::now())
    }
}
