//! Server settings for the repository catalog and its background services.

use crate::error::{CatalogError, Result};
use crate::record::MergeType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Comprehensive settings for a repohost server.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Repository discovery and list caching.
    #[serde(default)]
    pub catalog: CatalogSettings,

    /// Garbage collection defaults and schedule.
    #[serde(default)]
    pub gc: GcSettings,

    /// Mirror fetching.
    #[serde(default)]
    pub mirror: MirrorSettings,

    /// Ticket defaults applied to records that do not override them.
    #[serde(default)]
    pub tickets: TicketSettings,
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| CatalogError::Config(format!("failed to read settings: {}", e)))?;
            toml::from_str(&content)
                .map_err(|e| CatalogError::Config(format!("failed to parse settings: {}", e)))
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CatalogError::Config(format!("failed to serialize settings: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| CatalogError::Config(format!("failed to write settings: {}", e)))?;
        Ok(())
    }

    /// Checksum over the settings that change which repositories `list()` discovers.
    ///
    /// Any difference between two checksums invalidates the whole list cache.
    pub fn list_checksum(&self) -> String {
        let c = &self.catalog;
        let mut hasher = blake3::Hasher::new();
        for part in [
            c.cache_repository_list.to_string(),
            c.only_access_bare_repositories.to_string(),
            c.search_repositories_subfolders.to_string(),
            c.search_recursion_depth.to_string(),
            format!("{:?}", c.search_exclusions),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Repository discovery, caching and mutation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogSettings {
    /// Folder holding every hosted repository.
    pub repositories_folder: PathBuf,

    /// Keep the repository list and records in memory (default: true).
    pub cache_repository_list: bool,

    /// Ignore repositories with a working tree (default: false).
    pub only_access_bare_repositories: bool,

    /// Descend into subfolders when scanning (default: true).
    pub search_repositories_subfolders: bool,

    /// Maximum scan depth, -1 for unlimited (default: -1).
    pub search_recursion_depth: i32,

    /// Glob patterns of repository paths to skip while scanning.
    pub search_exclusions: Vec<String>,

    /// Compute and display on-disk sizes (default: true).
    pub show_repository_sizes: bool,

    /// Allow deleting repositories that have history (default: true).
    pub allow_deleting_non_empty_repositories: bool,

    /// Group name that maps onto the repositories folder root (default: "main").
    pub repository_root_group_name: String,

    /// Project prefix for personal repositories (default: "~").
    pub user_repository_prefix: String,

    /// Create repositories group-writable (default: false).
    pub create_repositories_shared: bool,

    /// Default access restriction for records that do not set one.
    pub default_access_restriction: String,

    /// Default authorization control for records that do not set one.
    pub default_authorization_control: String,

    /// Default activity commit cap (default: 0).
    pub max_activity_commits: i32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            repositories_folder: PathBuf::from("git"),
            cache_repository_list: true,
            only_access_bare_repositories: false,
            search_repositories_subfolders: true,
            search_recursion_depth: -1,
            search_exclusions: Vec::new(),
            show_repository_sizes: true,
            allow_deleting_non_empty_repositories: true,
            repository_root_group_name: "main".to_string(),
            user_repository_prefix: "~".to_string(),
            create_repositories_shared: false,
            default_access_restriction: "PUSH".to_string(),
            default_authorization_control: "NAMED".to_string(),
            max_activity_commits: 0,
        }
    }
}

/// Garbage collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GcSettings {
    /// Run the garbage collector (default: false).
    pub enabled: bool,

    /// Hour of day (0-23) of the first daily run (default: 0).
    pub hour: u32,

    /// Minimum repository size before collection is worthwhile (default: "500KB").
    pub default_threshold: String,

    /// Days between collections of one repository (default: 7).
    pub default_period_days: i64,
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: 0,
            default_threshold: "500KB".to_string(),
            default_period_days: 7,
        }
    }
}

/// Mirror fetching configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MirrorSettings {
    /// Periodically fetch mirror remotes (default: false).
    pub enabled: bool,

    /// Minutes between sweeps; values below 5 are raised to 5 (default: 30).
    pub period_mins: u64,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            period_mins: 30,
        }
    }
}

impl MirrorSettings {
    /// Returns the sweep period as a Duration.
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_mins.max(5) * 60)
    }
}

/// Ticket defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TicketSettings {
    /// Require approval before merging (default: false).
    pub require_approval: bool,

    /// Default merge policy (default: MERGE_ALWAYS).
    pub merge_type: MergeType,

    /// Default incremental push tag prefix (default: "r").
    pub incremental_push_tag_prefix: String,
}

impl Default for TicketSettings {
    fn default() -> Self {
        Self {
            require_approval: false,
            merge_type: MergeType::MergeAlways,
            incremental_push_tag_prefix: "r".to_string(),
        }
    }
}
