//! Realm Store
//!
//! Persistence for the Succubus Realm "swipe to like" demo: two flat JSON
//! files (characters, likes) behind an in-process advisory lock, with a
//! one-generation backup on every write and a reconciler that keeps the like
//! counters consistent with the character list.
//!
//! # Architecture
//!
//! ```text
//! caller → RealmData → LikesRepository ─┐
//!                    → CharactersRepository ─┼→ JsonStore (lock table) → disk
//!                    → Reconciler ───────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use realm_store::{RealmData, StoreConfig};
//!
//! # async fn example() {
//! let realm = RealmData::new(StoreConfig::new().with_data_dir("data"));
//! realm.startup().await;
//!
//! let total = realm.likes().increment(1).await?;
//! let harem = realm.characters().ranking(Some(10)).await;
//! # }
//! ```
//!
//! # Limitations
//!
//! Writes are serialized per path within one process only. Two processes
//! sharing the data directory can lose each other's updates.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod characters;
pub mod config;
pub mod error;
pub mod likes;
pub mod realm;
pub mod reconcile;
pub mod store;

// Re-exports for convenience
pub use characters::{Character, CharacterWithLikes, CharactersDocument, CharactersRepository};
pub use config::{Environment, StoreConfig};
pub use error::{ConfigError, LikesValidationError, StoreError, StoreResult};
pub use likes::{validate, LikeStatistics, LikesDocument, LikesRepository};
pub use realm::RealmData;
pub use reconcile::{IntegrityIssue, ReconcileReport, Reconciler};
pub use store::{FileLock, JsonStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the realm store
    pub use crate::characters::{Character, CharacterWithLikes, CharactersRepository};
    pub use crate::config::{Environment, StoreConfig};
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::likes::{LikeStatistics, LikesDocument, LikesRepository};
    pub use crate::realm::RealmData;
    pub use crate::reconcile::{ReconcileReport, Reconciler};
}
