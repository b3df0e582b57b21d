//! Economy Module
//!
//! Grants and the user-side collaborators they mutate.
//!
//! ## Module Structure
//!
//! - `transaction`: Server-issued grant, parsed and performed once
//! - `resource`: Single-currency customer support grant
//! - `given`: Ids of transactions already granted through the shop
//! - `profile`: User profile store (ledger, reward queue)
//! - `persistence`: Durable save trigger
//! - `settings`: Feature flags, game flow, manager configuration

pub mod transaction;
pub mod resource;
pub mod given;
pub mod profile;
pub mod persistence;
pub mod settings;

// Re-export key types
pub use transaction::{Transaction, TransactionState, PerformType, ItemRewardEntry};
pub use resource::TransactionResource;
pub use given::GivenTransactions;
pub use profile::{ProfileStore, InMemoryProfile};
pub use persistence::{SaveRequester, SaveCounter, ChannelSaver};
pub use settings::{FeatureSettings, FeatureFlags, GameFlow, SceneFlag, ManagerConfig, ConfigError};
