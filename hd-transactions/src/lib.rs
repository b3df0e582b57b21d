//! # Hungry Dragon Pending Transactions
//!
//! Client-side reconciliation of server-issued grants: customer support
//! gifts and shop purchases whose flow was interrupted.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  PENDING TRANSACTIONS                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Economy primitives                      │
//! │  ├── currency.rs   - Currency kinds and wire keys            │
//! │  ├── reward.rs     - Rewards and economy groups              │
//! │  ├── happy_hour.rs - Extra gems offer                        │
//! │  └── safe_parse.rs - Lenient number parsing                  │
//! │                                                              │
//! │  economy/          - Grants and user-side collaborators      │
//! │  ├── transaction.rs- Parsed grant, performed once            │
//! │  ├── resource.rs   - Single-currency support grant           │
//! │  ├── given.rs      - Ids already granted by the shop         │
//! │  ├── profile.rs    - Ledger and reward queue                 │
//! │  ├── persistence.rs- Save trigger                            │
//! │  └── settings.rs   - Feature flags and configuration         │
//! │                                                              │
//! │  network/          - Server side                             │
//! │  ├── protocol.rs   - Wire documents                          │
//! │  ├── client.rs     - Server trait                            │
//! │  ├── offline.rs    - In-process server                       │
//! │  └── manager.rs    - Poll / confirm / apply state machine    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exactly Once
//!
//! A transaction is applied at most once per instance: performing flips it
//! to `Performed` and any later call is a no-op. Across sessions, the server
//! stops listing a transaction once it has been confirmed, and ids granted
//! by the shop are skipped through the given transactions set.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod economy;
pub mod network;

// Re-export commonly used types
pub use crate::core::currency::CurrencyKind;
pub use crate::core::reward::{EconomyGroup, Reward};
pub use crate::economy::resource::TransactionResource;
pub use crate::economy::transaction::{PerformType, Transaction, TransactionState};
pub use crate::network::manager::{Collaborators, PendingState, TransactionManager, TransactionManagerHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
