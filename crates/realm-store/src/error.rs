//! Error types for the realm data store
//!
//! Provides error handling for:
//! - File operations (read, backup, write)
//! - Likes document validation
//! - Configuration loading

use std::path::PathBuf;

/// Errors raised by the JSON store and the repositories built on it
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error on a data file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid JSON for the expected document
    #[error("malformed json in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Document could not be serialized
    #[error("failed to serialize document for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Likes document failed shape validation
    #[error("invalid likes document: {0}")]
    InvalidLikes(#[from] LikesValidationError),

    /// Counter is already at the largest representable value
    #[error("like count for character {id} cannot be incremented past {count}")]
    CountOverflow { id: u64, count: u64 },

    /// Blocking file task did not complete
    #[error("file task failed: {0}")]
    Join(String),
}

impl StoreError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create parse error for path
    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    /// Check if the underlying cause is a missing file
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Shape violations in a likes document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LikesValidationError {
    /// Root is not a JSON object
    #[error("document is not an object")]
    NotAnObject,

    /// `likes` field is absent or not an object
    #[error("`likes` field is missing or not an object")]
    MissingLikes,

    /// A counter is negative, fractional or not a number
    #[error("like count for id {id} is invalid: {value}")]
    InvalidCount { id: String, value: String },
}

/// Errors during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for `StoreConfig`
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_count_display() {
        let err = LikesValidationError::InvalidCount {
            id: "1".to_string(),
            value: "-1".to_string(),
        };
        assert_eq!(err.to_string(), "like count for id 1 is invalid: -1");
    }

    #[test]
    fn validation_error_converts() {
        let err: StoreError = LikesValidationError::MissingLikes.into();
        assert!(matches!(err, StoreError::InvalidLikes(_)));
        assert!(err.to_string().contains("`likes` field"));
    }

    #[test]
    fn count_overflow_display() {
        let err = StoreError::CountOverflow {
            id: 3,
            count: u64::MAX,
        };
        assert_eq!(
            err.to_string(),
            format!("like count for character 3 cannot be incremented past {}", u64::MAX)
        );
    }

    #[test]
    fn not_found_detection() {
        let missing = StoreError::io(
            "likes.json",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(missing.is_not_found());

        let denied = StoreError::io(
            "likes.json",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(!denied.is_not_found());
    }
}
