//! Single-currency grant issued by customer support.

use tracing::debug;

use crate::core::currency::CurrencyKind;
use crate::core::reward::EconomyGroup;
use crate::economy::persistence::SaveRequester;
use crate::economy::profile::ProfileStore;

/// An amount of one currency to credit the user with.
///
/// Unlike [`crate::economy::transaction::Transaction`] there is no performed
/// latch: every call to `perform` credits again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionResource {
    currency: CurrencyKind,
    amount: i64,
}

impl TransactionResource {
    /// Create an empty resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset, then set currency and amount.
    pub fn setup(&mut self, currency: CurrencyKind, amount: i64) {
        self.reset();
        self.currency = currency;
        self.amount = amount;
    }

    /// Clear fields.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Currency credited.
    pub fn currency(&self) -> CurrencyKind {
        self.currency
    }

    /// Amount credited.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Only positive grants of a real currency are supported.
    pub fn can_perform(&self) -> bool {
        self.currency.is_some() && self.amount > 0
    }

    /// Credit the ledger and request a save. Returns whether anything ran.
    pub fn perform(&self, profile: &dyn ProfileStore, persistence: &dyn SaveRequester) -> bool {
        if !self.can_perform() {
            debug!("Resource {:?} x{} can't be performed", self.currency, self.amount);
            return false;
        }

        profile.earn_currency(self.currency, self.amount, EconomyGroup::CustomerSupport);
        persistence.request_save();
        true
    }
}
