//! Likes repository
//!
//! Typed operations over the `{"likes": {"<id>": <count>}}` document.

use crate::error::{LikesValidationError, StoreError, StoreResult};
use crate::store::{FileLock, JsonStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Like counters keyed by character id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikesDocument {
    /// Character id (decimal string) → like count
    pub likes: BTreeMap<String, u64>,
}

impl LikesDocument {
    /// Empty document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for a character, 0 if absent
    #[inline]
    #[must_use]
    pub fn count(&self, character_id: u64) -> u64 {
        self.likes
            .get(&character_id.to_string())
            .copied()
            .unwrap_or(0)
    }

    /// Counters with numeric keys; other keys are skipped
    #[must_use]
    pub fn numeric(&self) -> BTreeMap<u64, u64> {
        self.likes
            .iter()
            .filter_map(|(id, count)| id.parse::<u64>().ok().map(|id| (id, *count)))
            .collect()
    }
}

/// Aggregate figures over all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatistics {
    /// Characters with a counter
    pub total_characters: usize,
    /// Sum of all counters
    pub total_likes: u64,
    /// Mean counter, rounded to two decimals
    pub average_likes: f64,
}

impl LikeStatistics {
    /// Compute statistics over counters
    #[must_use]
    pub fn from_counts(counts: &BTreeMap<u64, u64>) -> Self {
        let total_characters = counts.len();
        let total_likes: u64 = counts.values().sum();
        #[allow(clippy::cast_precision_loss)]
        let average_likes = if total_characters == 0 {
            0.0
        } else {
            (total_likes as f64 / total_characters as f64 * 100.0).round() / 100.0
        };
        Self {
            total_characters,
            total_likes,
            average_likes,
        }
    }
}

/// Check the shape of a raw likes document
///
/// The root must be an object with a `likes` object whose every value is a
/// non-negative integer. Stops at the first violation.
///
/// # Errors
/// The first `LikesValidationError` found
pub fn validate(document: &Value) -> Result<(), LikesValidationError> {
    let root = document
        .as_object()
        .ok_or(LikesValidationError::NotAnObject)?;
    let likes = root
        .get("likes")
        .and_then(Value::as_object)
        .ok_or(LikesValidationError::MissingLikes)?;

    for (id, count) in likes {
        if count.as_u64().is_none() {
            return Err(LikesValidationError::InvalidCount {
                id: id.clone(),
                value: count.to_string(),
            });
        }
    }
    Ok(())
}

/// Repository over the likes file
#[derive(Debug, Clone)]
pub struct LikesRepository {
    store: Arc<JsonStore>,
    path: PathBuf,
}

impl LikesRepository {
    /// Create repository for the likes file at path
    #[must_use]
    pub fn new(store: Arc<JsonStore>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    /// Likes file path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the likes file lock
    ///
    /// Hold it across a read-modify-write and finish with [`Self::write_locked`].
    pub async fn lock(&self) -> FileLock {
        self.store.lock(&self.path).await
    }

    /// Load the likes document
    ///
    /// A missing, unreadable or invalid file yields an empty document. With
    /// backup restore enabled, a valid backup is used first, whether the
    /// primary failed to parse or failed validation. The file itself is left
    /// as is until the next successful write.
    pub async fn read(&self) -> LikesDocument {
        let fallback = serde_json::json!({ "likes": {} });
        let raw = match self.store.safe_read(&self.path, Some(fallback)).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(path = %self.path.display(), error = %err, "failed to load likes");
                return LikesDocument::new();
            }
        };

        if let Err(err) = validate(&raw) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "likes document is invalid"
            );
            return self.restore_valid_backup().await.unwrap_or_else(|| {
                tracing::warn!(path = %self.path.display(), "substituting an empty likes document");
                LikesDocument::new()
            });
        }

        serde_json::from_value(raw).unwrap_or_else(|err| {
            tracing::warn!(path = %self.path.display(), error = %err, "likes document did not decode");
            LikesDocument::new()
        })
    }

    async fn restore_valid_backup(&self) -> Option<LikesDocument> {
        if !self.store.restores_from_backup() {
            return None;
        }
        let raw: Value = self.store.read_backup(&self.path).await.ok()?;
        if let Err(err) = validate(&raw) {
            tracing::debug!(path = %self.path.display(), error = %err, "likes backup is invalid too");
            return None;
        }
        serde_json::from_value(raw).ok()
    }

    /// Validate and persist a likes document
    ///
    /// Returns `false` without writing if validation fails.
    pub async fn write(&self, document: &LikesDocument) -> bool {
        if !self.check_before_write(document) {
            return false;
        }
        self.store.safe_write(&self.path, document).await
    }

    /// Validate and persist a likes document under a held lock
    ///
    /// # Errors
    /// - `StoreError::InvalidLikes` if the document fails validation
    /// - Any store error from the write
    pub async fn write_locked(&self, lock: &FileLock, document: &LikesDocument) -> StoreResult<()> {
        let value = serde_json::to_value(document).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        validate(&value)?;
        self.store.write_locked(lock, document).await
    }

    fn check_before_write(&self, document: &LikesDocument) -> bool {
        let checked = serde_json::to_value(document)
            .map_err(|e| e.to_string())
            .and_then(|value| validate(&value).map_err(|e| e.to_string()));
        match checked {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(path = %self.path.display(), error = %err, "refusing to write invalid likes");
                false
            }
        }
    }

    /// Add one like to a character and return the new count
    ///
    /// The read-increment-write cycle runs under the file lock, so concurrent
    /// increments within this process are never lost.
    ///
    /// # Errors
    /// - `StoreError::CountOverflow` if the counter is at `u64::MAX`; nothing is written
    /// - The store error if the updated document cannot be written
    pub async fn increment(&self, character_id: u64) -> StoreResult<u64> {
        let lock = self.lock().await;
        let mut document = self.read().await;
        let current = document.count(character_id);
        let Some(updated) = current.checked_add(1) else {
            tracing::error!(character_id, count = current, "like count is at its maximum");
            return Err(StoreError::CountOverflow {
                id: character_id,
                count: current,
            });
        };
        document.likes.insert(character_id.to_string(), updated);

        if let Err(err) = self.write_locked(&lock, &document).await {
            tracing::error!(character_id, error = %err, "failed to save like");
            return Err(err);
        }
        tracing::info!(character_id, from = current, to = updated, "incremented like count");
        Ok(updated)
    }

    /// Like count for a character; unknown ids have zero likes
    pub async fn get_count(&self, character_id: u64) -> u64 {
        self.read().await.count(character_id)
    }

    /// All counters keyed by numeric id
    pub async fn get_all(&self) -> BTreeMap<u64, u64> {
        self.read().await.numeric()
    }

    /// Totals and average over all counters
    pub async fn statistics(&self) -> LikeStatistics {
        LikeStatistics::from_counts(&self.get_all().await)
    }

    /// Create an empty likes file if none exists
    ///
    /// Returns `false` only when creation was needed and failed.
    pub async fn initialize_if_missing(&self) -> bool {
        let lock = self.lock().await;
        if self.store.exists(&self.path).await {
            tracing::debug!(path = %self.path.display(), "likes file already exists");
            return true;
        }

        tracing::info!(path = %self.path.display(), "likes file missing, initializing");
        let document = LikesDocument::new();
        match self.write_locked(&lock, &document).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(path = %self.path.display(), error = %err, "failed to initialize likes");
                false
            }
        }
    }

    /// Merge an incoming likes document, keeping the larger count per id
    ///
    /// # Errors
    /// - `StoreError::InvalidLikes` if `incoming` is not a valid likes document
    /// - Any store error from the write
    pub async fn merge(&self, incoming: &Value) -> StoreResult<LikesDocument> {
        validate(incoming)?;
        let incoming: LikesDocument =
            serde_json::from_value(incoming.clone()).map_err(|e| StoreError::parse(&self.path, e))?;

        let lock = self.lock().await;
        let mut document = self.read().await;
        for (id, count) in incoming.likes {
            let entry = document.likes.entry(id).or_insert(0);
            *entry = (*entry).max(count);
        }
        self.write_locked(&lock, &document).await?;
        tracing::info!(path = %self.path.display(), entries = document.likes.len(), "merged likes");
        Ok(document)
    }
}
