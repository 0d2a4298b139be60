//! Error types for repohost_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for catalog operations.
///
/// Read paths never surface missing data as an error; they return `None` or an
/// empty collection instead. These variants are for explicit mutations and for
/// collaborator failures that a caller must see.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The target repository is being garbage collected.
    #[error("busy collecting garbage in {repository}")]
    Busy {
        /// Repository under collection
        repository: String,
    },

    /// Create or rename target already exists.
    #[error("can not use '{requested}' for '{existing}' because '{requested}' already exists")]
    Conflict {
        /// Name of the repository being created or renamed
        existing: String,
        /// Name that is already taken
        requested: String,
    },

    /// A mutation required a repository that does not exist.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// Deletion of a repository with history was refused by policy.
    #[error("refusing to delete non-empty repository {0}")]
    DeleteRefused(String),

    /// Durable configuration or storage move failed.
    #[error("failed to persist {repository}: {reason}")]
    Persistence {
        /// Repository being persisted
        repository: String,
        /// Description of the failure
        reason: String,
    },

    /// A storage handle could not be fully closed.
    #[error("failed to close {repository}: {reason}")]
    CloseFailed {
        /// Repository whose handle failed to close
        repository: String,
        /// Description of the failure
        reason: String,
    },

    /// Fetching from a mirror remote failed.
    #[error("fetch from {remote} failed for {repository}: {reason}")]
    Fetch {
        /// Repository being fetched into
        repository: String,
        /// Remote name
        remote: String,
        /// Description of the failure
        reason: String,
    },

    /// Repository name is empty or escapes the repositories folder.
    #[error("invalid repository name: {0}")]
    InvalidName(String),

    /// Invalid repository config content.
    #[error("invalid config at {}: {}", path.display(), reason)]
    InvalidConfig {
        /// Path of the offending config file
        path: PathBuf,
        /// Description of what's invalid
        reason: String,
    },

    /// Settings error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Identity directory update failed.
    #[error("identity directory error: {0}")]
    Identity(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Busy { .. } => Some("Wait for the garbage collector to finish and retry."),
            Self::Conflict { .. } => {
                Some("Pick a different name, or delete the existing repository first.")
            }
            Self::DeleteRefused(_) => Some(
                "Enable 'allow_deleting_non_empty_repositories' in settings to delete repositories with history.",
            ),
            Self::CloseFailed { .. } => Some(
                "Another process might still be reading this repository. Retry once it is idle.",
            ),
            Self::InvalidConfig { .. } => {
                Some("Fix or remove the repository's repohost.toml; it will be regenerated on next edit.")
            }
            Self::Fetch { .. } => Some("Check the mirror remote URL and credentials."),
            _ => None,
        }
    }
}

/// Convenience Result type for repohost_core operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
