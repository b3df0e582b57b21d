//! Given transactions
//!
//! Ids of transactions the player already received through another path.
//! When a shop purchase is verified the reward is given straight away, but if
//! the flow was interrupted the server also reports it as a pending
//! transaction. Ids stored here make the pending flow skip those.

use std::collections::BTreeSet;
use tracing::debug;

use crate::economy::persistence::SaveRequester;
use crate::economy::profile::ProfileStore;

/// Separator used when persisting ids in the profile.
pub const GIVEN_TRANSACTIONS_SEPARATOR: char = ':';

/// Set of already-given transaction ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GivenTransactions {
    ids: BTreeSet<String>,
}

impl GivenTransactions {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every id.
    pub fn reset(&mut self) {
        self.ids.clear();
    }

    /// Load ids stored in the profile, adding to the current set.
    pub fn load(&mut self, profile: &dyn ProfileStore) {
        let raw = profile.given_transactions();
        debug!("GIVEN load raw: {:?}", raw);

        if let Some(raw) = raw {
            for id in raw.split(GIVEN_TRANSACTIONS_SEPARATOR) {
                self.insert(id);
            }
        }
    }

    fn insert(&mut self, id: &str) -> bool {
        !id.is_empty() && self.ids.insert(id.to_string())
    }

    /// Whether an id is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of ids stored.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no id is stored.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Add an id. Empty and duplicate ids are ignored. Saves when `save` is set
    /// and the id was new.
    pub fn add(
        &mut self,
        id: &str,
        save: bool,
        profile: &dyn ProfileStore,
        persistence: &dyn SaveRequester,
    ) {
        if self.insert(id) && save {
            debug!("Transaction with id {} added to GIVEN", id);
            self.save(profile, persistence);
        }
    }

    /// Remove an id, saving if it was present.
    pub fn remove(&mut self, id: &str, profile: &dyn ProfileStore, persistence: &dyn SaveRequester) {
        if self.ids.remove(id) {
            debug!("Transaction with id {} removed from GIVEN", id);
            self.save(profile, persistence);
        }
    }

    /// Ids joined by [`GIVEN_TRANSACTIONS_SEPARATOR`]. `None` when empty.
    pub fn to_raw(&self) -> Option<String> {
        if self.ids.is_empty() {
            return None;
        }
        let separator = GIVEN_TRANSACTIONS_SEPARATOR.to_string();
        let parts: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        Some(parts.join(separator.as_str()))
    }

    fn save(&self, profile: &dyn ProfileStore, persistence: &dyn SaveRequester) {
        profile.set_given_transactions(self.to_raw());
        debug!("GIVEN transactions: {:?} saved", profile.given_transactions());
        persistence.request_save();
    }
}
