//! Integrity reconciler
//!
//! Keeps the key set of the likes document equal to the set of live
//! character ids:
//! - every character id gets a counter (seeded at 0)
//! - counters for ids no character carries are removed
//! - characters without an id, and duplicate ids, are reported only
//!
//! All changes are persisted with a single write.

use crate::characters::CharactersRepository;
use crate::error::StoreResult;
use crate::likes::LikesRepository;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// A finding from a reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// Character has no usable id
    MissingId {
        /// Name of the offending character
        name: String,
    },
    /// Two characters share an id
    DuplicateId {
        /// The repeated id
        id: u64,
    },
    /// Counter for an id no character has; removed
    OrphanedCounter {
        /// Likes key that was removed
        id: String,
        /// Count it held
        count: u64,
    },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId { name } => write!(f, "character \"{name}\" has no id"),
            Self::DuplicateId { id } => write!(f, "character id {id} appears more than once"),
            Self::OrphanedCounter { id, count } => {
                write!(f, "removed {count} likes for unknown character id {id}")
            }
        }
    }
}

/// Outcome of a reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Ids that received a zero counter
    pub seeded: Vec<u64>,
    /// Likes keys that were deleted
    pub removed: Vec<String>,
    /// Everything worth telling an operator
    pub issues: Vec<IntegrityIssue>,
    /// Whether the likes file was rewritten
    pub written: bool,
}

impl ReconcileReport {
    /// Whether the likes document had to change
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.seeded.is_empty() || !self.removed.is_empty()
    }
}

/// Cross-checks likes against characters
#[derive(Debug, Clone)]
pub struct Reconciler {
    likes: LikesRepository,
    characters: CharactersRepository,
}

impl Reconciler {
    /// Create reconciler over both repositories
    #[must_use]
    pub fn new(likes: LikesRepository, characters: CharactersRepository) -> Self {
        Self { likes, characters }
    }

    /// Reconcile and report success; failures are logged, never raised
    pub async fn reconcile(&self) -> bool {
        match self.run().await {
            Ok(report) => {
                tracing::info!(
                    seeded = report.seeded.len(),
                    removed = report.removed.len(),
                    issues = report.issues.len(),
                    written = report.written,
                    "data integrity check complete"
                );
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "data integrity check failed");
                false
            }
        }
    }

    /// Reconcile and return the details
    ///
    /// An unreadable character file aborts the run before anything is
    /// changed; otherwise every counter would look orphaned.
    ///
    /// # Errors
    /// - Any store error reading the character file
    /// - Any store error writing the likes file
    pub async fn run(&self) -> StoreResult<ReconcileReport> {
        let characters = self.characters.try_read_all().await?;

        let lock = self.likes.lock().await;
        let mut document = self.likes.read().await;
        let mut report = ReconcileReport::default();
        let mut valid_ids = BTreeSet::new();

        for character in &characters.succubi {
            let Some(id) = character.valid_id() else {
                report.issues.push(IntegrityIssue::MissingId {
                    name: character.name.clone(),
                });
                continue;
            };
            if !valid_ids.insert(id) {
                report.issues.push(IntegrityIssue::DuplicateId { id });
                continue;
            }
            let key = id.to_string();
            if !document.likes.contains_key(&key) {
                document.likes.insert(key, 0);
                report.seeded.push(id);
            }
        }

        let valid_keys: BTreeSet<String> = valid_ids.iter().map(ToString::to_string).collect();
        let orphaned: Vec<String> = document
            .likes
            .keys()
            .filter(|key| !valid_keys.contains(*key))
            .cloned()
            .collect();
        for key in orphaned {
            let count = document.likes.remove(&key).unwrap_or(0);
            report.issues.push(IntegrityIssue::OrphanedCounter {
                id: key.clone(),
                count,
            });
            report.removed.push(key);
        }

        if report.changed() {
            self.likes.write_locked(&lock, &document).await?;
            report.written = true;
            tracing::info!(path = %self.likes.path().display(), "repaired likes document");
        }

        for issue in &report.issues {
            tracing::warn!(%issue, "data integrity issue");
        }

        Ok(report)
    }
}
