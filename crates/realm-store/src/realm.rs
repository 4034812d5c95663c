//! Realm data - composition root
//!
//! Builds a single [`JsonStore`] from configuration and wires both
//! repositories and the reconciler to it, so every writer of a file goes
//! through the same lock table.

use crate::characters::CharactersRepository;
use crate::config::StoreConfig;
use crate::likes::LikesRepository;
use crate::reconcile::Reconciler;
use crate::store::JsonStore;
use std::sync::Arc;

/// Entry point for callers (HTTP handlers, maintenance tools)
#[derive(Debug, Clone)]
pub struct RealmData {
    config: StoreConfig,
    store: Arc<JsonStore>,
    likes: LikesRepository,
    characters: CharactersRepository,
    reconciler: Reconciler,
}

impl RealmData {
    /// Wire repositories for a configuration
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        let store = Arc::new(JsonStore::from_config(&config));
        let likes = LikesRepository::new(Arc::clone(&store), config.likes_path());
        let characters =
            CharactersRepository::new(Arc::clone(&store), config.characters_path(), likes.clone());
        let reconciler = Reconciler::new(likes.clone(), characters.clone());
        Self {
            config,
            store,
            likes,
            characters,
            reconciler,
        }
    }

    /// Startup sequence: create the likes file if needed, then reconcile
    ///
    /// Never fails the caller; returns whether both steps succeeded.
    pub async fn startup(&self) -> bool {
        tracing::info!(data_dir = %self.config.data_dir.display(), "initializing likes data");
        let initialized = self.likes.initialize_if_missing().await;

        tracing::info!("running data integrity check");
        let reconciled = self.reconciler.reconcile().await;

        initialized && reconciled
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Shared JSON store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<JsonStore> {
        &self.store
    }

    /// Likes repository
    #[inline]
    #[must_use]
    pub fn likes(&self) -> &LikesRepository {
        &self.likes
    }

    /// Characters repository
    #[inline]
    #[must_use]
    pub fn characters(&self) -> &CharactersRepository {
        &self.characters
    }

    /// Integrity reconciler
    #[inline]
    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}
