//! JSON document store
//!
//! Safe read/write of whole JSON documents at file paths:
//! - Reads degrade to a caller-supplied fallback instead of failing
//! - Writes take a per-path advisory lock, keep one backup generation and
//!   replace the primary file atomically (temp file + rename)
//!
//! # Locking
//!
//! The lock table belongs to the [`JsonStore`] instance. Share one store (via
//! `Arc`) between every repository touching the same files; two stores over
//! the same path do not exclude each other, and neither do two processes.
//!
//! ```rust,ignore
//! let store = JsonStore::new(".backup");
//! let lock = store.lock("data/likes-data.json").await;
//! let mut doc: Value = store.safe_read(lock.path(), Some(json!({}))).await?;
//! doc["visits"] = json!(1);
//! store.write_locked(&lock, &doc).await?;
//! ```

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held advisory lock on one data file
///
/// Dropping the guard releases the lock, whichever way the holder exits.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl FileLock {
    /// Path this lock covers
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// JSON file store with per-path write serialization
#[derive(Debug, Default)]
pub struct JsonStore {
    /// Absolute path → lock; waiters are served in arrival order
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    /// Appended to a path to name its backup
    backup_suffix: String,
    /// Try the backup before the fallback when a read fails
    restore_from_backup: bool,
}

impl JsonStore {
    /// Create store with backup suffix
    #[must_use]
    pub fn new(backup_suffix: impl Into<String>) -> Self {
        Self {
            locks: DashMap::new(),
            backup_suffix: backup_suffix.into(),
            restore_from_backup: false,
        }
    }

    /// Create store from configuration
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.backup_suffix.clone()).with_restore_from_backup(config.restore_from_backup)
    }

    /// With backup restore on failed reads
    #[inline]
    #[must_use]
    pub fn with_restore_from_backup(mut self, enabled: bool) -> Self {
        self.restore_from_backup = enabled;
        self
    }

    /// Whether failed reads fall back to the backup
    #[inline]
    #[must_use]
    pub fn restores_from_backup(&self) -> bool {
        self.restore_from_backup
    }

    /// Backup path for a data file (`<path><suffix>`)
    #[must_use]
    pub fn backup_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let mut name: OsString = path.as_ref().as_os_str().to_owned();
        name.push(&self.backup_suffix);
        PathBuf::from(name)
    }

    /// Check whether a file exists at path
    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Acquire the advisory lock for path
    ///
    /// Waits for the current holder, if any. Relative paths are resolved
    /// against the working directory and `.`/`..` parts are folded, so
    /// spellings of the same path share one lock. Symlinks are not resolved.
    pub async fn lock(&self, path: impl AsRef<Path>) -> FileLock {
        let path = path.as_ref();
        let mutex = self.locks.entry(lock_key(path)).or_default().clone();
        let guard = mutex.lock_owned().await;
        tracing::trace!(path = %path.display(), "acquired file lock");
        FileLock {
            path: path.to_path_buf(),
            _guard: guard,
        }
    }

    /// Read and parse the JSON document at path
    ///
    /// On failure the error is logged, then (if enabled) the backup is tried,
    /// then `fallback` is returned when supplied.
    ///
    /// # Errors
    /// - `StoreError::Io` if the file cannot be read and no fallback is given
    /// - `StoreError::Parse` if the content is malformed and no fallback is given
    pub async fn safe_read<T: DeserializeOwned>(
        &self,
        path: impl AsRef<Path>,
        fallback: Option<T>,
    ) -> StoreResult<T> {
        let path = path.as_ref();
        let err = match read_document(path).await {
            Ok(document) => return Ok(document),
            Err(err) => err,
        };

        if err.is_not_found() {
            tracing::info!(path = %path.display(), "json document does not exist");
        } else {
            tracing::warn!(path = %path.display(), error = %err, "failed to read json document");
        }

        if self.restore_from_backup {
            if let Ok(document) = self.read_backup(path).await {
                return Ok(document);
            }
        }

        match fallback {
            Some(document) => {
                tracing::info!(path = %path.display(), "using fallback document");
                Ok(document)
            }
            None => Err(err),
        }
    }

    /// Read and parse the backup of the document at path
    ///
    /// # Errors
    /// - `StoreError::Io` if the backup cannot be read
    /// - `StoreError::Parse` if the backup is malformed
    pub async fn read_backup<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StoreResult<T> {
        let path = path.as_ref();
        let backup = self.backup_path(path);
        match read_document(&backup).await {
            Ok(document) => {
                tracing::warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    "restored json document from backup"
                );
                Ok(document)
            }
            Err(err) => {
                tracing::debug!(backup = %backup.display(), error = %err, "backup unusable");
                Err(err)
            }
        }
    }

    /// Write document to path under its lock
    ///
    /// Returns `false` (after logging) if the write fails.
    pub async fn safe_write<T: Serialize + ?Sized>(&self, path: impl AsRef<Path>, document: &T) -> bool {
        let lock = self.lock(path).await;
        match self.write_locked(&lock, document).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(path = %lock.path().display(), error = %err, "failed to write json document");
                false
            }
        }
    }

    /// Write document to the locked path
    ///
    /// Copies the current file to its backup (a failed backup is logged and
    /// ignored), then replaces the primary with pretty-printed JSON.
    ///
    /// # Errors
    /// - `StoreError::Serialize` if the document cannot be serialized
    /// - `StoreError::Io` if the temp file cannot be written or renamed
    pub async fn write_locked<T: Serialize + ?Sized>(
        &self,
        lock: &FileLock,
        document: &T,
    ) -> StoreResult<()> {
        let path = lock.path();
        let bytes = serde_json::to_vec_pretty(document).map_err(|source| StoreError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;

        self.backup(path).await;

        let target = path.to_path_buf();
        let len = bytes.len();
        tokio::task::spawn_blocking(move || replace_file(&target, &bytes))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;

        tracing::info!(path = %path.display(), bytes = len, "wrote json document");
        Ok(())
    }

    /// Copy the current file over its backup
    async fn backup(&self, path: &Path) {
        let backup = self.backup_path(path);
        match tokio::fs::copy(path, &backup).await {
            Ok(bytes) => {
                tracing::debug!(backup = %backup.display(), bytes, "backed up json document");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "nothing to back up");
            }
            Err(err) => {
                tracing::warn!(
                    backup = %backup.display(),
                    error = %err,
                    "backup failed, continuing with write"
                );
            }
        }
    }
}

async fn read_document<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| StoreError::parse(path, e))
}

/// Write bytes to a sibling temp file, then rename it over `path`
fn replace_file(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(path, e))?;
    temp.write_all(bytes).map_err(|e| StoreError::io(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(path, e))?;
    temp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

/// Absolute, lexically normalized form of path
fn lock_key(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut key = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match key.components().next_back() {
                Some(Component::Normal(_)) => {
                    key.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => key.push(component),
            },
            other => key.push(other),
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn setup() -> (TempDir, JsonStore, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        (dir, JsonStore::new(".backup"), path)
    }

    #[tokio::test]
    async fn read_missing_uses_fallback() {
        let (_dir, store, path) = setup();
        let doc: Value = store.safe_read(&path, Some(json!({"empty": true}))).await.unwrap();
        assert_eq!(doc, json!({"empty": true}));
    }

    #[tokio::test]
    async fn read_missing_without_fallback_errors() {
        let (_dir, store, path) = setup();
        let err = store.safe_read::<Value>(&path, None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn read_malformed_uses_fallback() {
        let (_dir, store, path) = setup();
        std::fs::write(&path, "{ not json").unwrap();

        let doc: Value = store.safe_read(&path, Some(json!({}))).await.unwrap();
        assert_eq!(doc, json!({}));

        let err = store.safe_read::<Value>(&path, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[tokio::test]
    async fn write_is_pretty_printed_with_two_spaces() {
        let (_dir, store, path) = setup();
        assert!(store.safe_write(&path, &json!({"likes": {"1": 2}})).await);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n  \"likes\": {\n    \"1\": 2\n  }\n}");
    }

    #[tokio::test]
    async fn backup_holds_previous_generation() {
        let (_dir, store, path) = setup();
        assert!(store.safe_write(&path, &json!({"v": 1})).await);
        assert!(!store.backup_path(&path).exists());

        assert!(store.safe_write(&path, &json!({"v": 2})).await);
        assert!(store.safe_write(&path, &json!({"v": 3})).await);

        let backup: Value =
            serde_json::from_str(&std::fs::read_to_string(store.backup_path(&path)).unwrap()).unwrap();
        assert_eq!(backup, json!({"v": 2}));
    }

    #[tokio::test]
    async fn failed_backup_does_not_abort_write() {
        let (_dir, store, path) = setup();
        assert!(store.safe_write(&path, &json!({"v": 1})).await);
        // A directory where the backup should go makes the copy fail
        std::fs::create_dir(store.backup_path(&path)).unwrap();

        assert!(store.safe_write(&path, &json!({"v": 2})).await);
        let doc: Value = store.safe_read(&path, None).await.unwrap();
        assert_eq!(doc, json!({"v": 2}));
    }

    #[tokio::test]
    async fn failed_write_releases_the_lock() {
        let (dir, store, _) = setup();
        let nested = dir.path().join("missing");
        let path = nested.join("doc.json");
        assert!(!store.safe_write(&path, &json!({"v": 1})).await);

        let relock =
            tokio::time::timeout(std::time::Duration::from_secs(5), store.lock(&path)).await;
        assert!(relock.is_ok());
        drop(relock);

        std::fs::create_dir(&nested).unwrap();
        assert!(store.safe_write(&path, &json!({"v": 2})).await);
    }

    #[test]
    fn lock_key_folds_dot_segments() {
        let plain = lock_key(Path::new("/srv/data/likes.json"));
        assert_eq!(lock_key(Path::new("/srv/data/./likes.json")), plain);
        assert_eq!(lock_key(Path::new("/srv/data/cache/../likes.json")), plain);
        assert_eq!(lock_key(Path::new("/../srv/data/likes.json")), plain);
    }

    #[tokio::test]
    async fn dot_segment_spellings_share_a_lock() {
        let store = JsonStore::new(".backup");
        let _held = store.lock("data/likes.json").await;

        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.lock("data/./likes.json"),
        )
        .await;
        assert!(attempt.is_err());
    }

    #[tokio::test]
    async fn write_into_missing_directory_returns_false() {
        let (dir, store, _) = setup();
        let path = dir.path().join("missing").join("doc.json");
        assert!(!store.safe_write(&path, &json!({})).await);
    }

    #[tokio::test]
    async fn write_leaves_no_temp_files() {
        let (dir, store, path) = setup();
        assert!(store.safe_write(&path, &json!({"v": 1})).await);
        assert!(store.safe_write(&path, &json!({"v": 2})).await);

        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["doc.json", "doc.json.backup"]);
    }

    #[tokio::test]
    async fn restore_from_backup_when_enabled() {
        let (_dir, store, path) = setup();
        let store = store.with_restore_from_backup(true);
        assert!(store.safe_write(&path, &json!({"v": 1})).await);
        assert!(store.safe_write(&path, &json!({"v": 2})).await);
        std::fs::write(&path, "garbage").unwrap();

        let doc: Value = store.safe_read(&path, Some(json!({}))).await.unwrap();
        assert_eq!(doc, json!({"v": 1}));
        // Reading never rewrites the primary
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "garbage");
    }

    #[tokio::test]
    async fn backup_path_appends_suffix() {
        let store = JsonStore::new(".test.backup");
        assert_eq!(
            store.backup_path("data/likes-data.json"),
            PathBuf::from("data/likes-data.json.test.backup")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lock_serializes_read_modify_write() {
        let (_dir, store, path) = setup();
        let store = Arc::new(store);
        assert!(store.safe_write(&path, &json!({"n": 0})).await);

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let store = Arc::clone(&store);
                let path = path.clone();
                tokio::spawn(async move {
                    let lock = store.lock(&path).await;
                    let doc: Value = store.safe_read(lock.path(), None).await.unwrap();
                    tokio::task::yield_now().await;
                    let n = doc["n"].as_u64().unwrap();
                    store.write_locked(&lock, &json!({"n": n + 1})).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let doc: Value = store.safe_read(&path, None).await.unwrap();
        assert_eq!(doc, json!({"n": 25}));
    }

    #[tokio::test]
    async fn relative_and_absolute_paths_share_a_lock() {
        let store = JsonStore::new(".backup");
        let absolute = std::env::current_dir().unwrap().join("shared.json");
        let _held = store.lock("shared.json").await;

        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.lock(&absolute),
        )
        .await;
        assert!(attempt.is_err());
    }
}
