//! Storage and per-repository configuration collaborators.
//!
//! The catalog never touches repository data directly. Everything it needs
//! from the object store, ref database and configuration file goes through
//! [`StorageBackend`] and [`ConfigStore`].

use crate::config::CatalogSettings;
use crate::error::{CatalogError, Result};
use crate::names::repository_key;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;
use url::Url;

#[derive(Debug)]
struct HandleState {
    name: String,
    git_dir: PathBuf,
    use_count: AtomicUsize,
}

/// Reference-counted handle to an open repository.
///
/// Every open increments the use-count and every close decrements it. Clones
/// share the same count.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    state: Arc<HandleState>,
}

impl StorageHandle {
    /// Creates an unopened handle (use-count zero).
    pub fn new(name: &str, git_dir: PathBuf) -> Self {
        Self {
            state: Arc::new(HandleState {
                name: name.to_string(),
                git_dir,
                use_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Repository name relative to the storage root.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Directory holding the repository's refs and objects.
    pub fn git_dir(&self) -> &Path {
        &self.state.git_dir
    }

    pub fn use_count(&self) -> usize {
        self.state.use_count.load(Ordering::SeqCst)
    }

    /// True if nobody holds the repository open. The catalog's `is_idle`
    /// instead allows the caller's own open.
    pub fn is_unused(&self) -> bool {
        self.use_count() == 0
    }

    /// Records one more open and returns a handle sharing the count.
    pub fn acquire(&self) -> StorageHandle {
        self.state.use_count.fetch_add(1, Ordering::SeqCst);
        self.clone()
    }

    /// Records one close, returning the remaining use-count.
    pub fn release(&self) -> Result<usize> {
        self.state
            .use_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| CatalogError::CloseFailed {
                repository: self.name().to_string(),
                reason: "handle is not open".to_string(),
            })
    }
}

/// Open handles keyed by repository key.
///
/// Handles stay registered after their count drops to zero so the count can
/// be queried; they are dropped on rename and removal.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    handles: DashMap<String, StorageHandle>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `name`, registering a handle on first use.
    pub fn open(&self, name: &str, git_dir: PathBuf) -> StorageHandle {
        self.handles
            .entry(repository_key(name))
            .or_insert_with(|| StorageHandle::new(name, git_dir))
            .acquire()
    }

    pub fn close(&self, handle: &StorageHandle) -> Result<()> {
        handle.release().map(|_| ())
    }

    /// Registered handle without opening it.
    pub fn get(&self, name: &str) -> Option<StorageHandle> {
        self.handles
            .get(&repository_key(name))
            .map(|h| h.value().clone())
    }

    pub fn use_count(&self, name: &str) -> usize {
        self.get(name).map(|h| h.use_count()).unwrap_or(0)
    }

    pub fn forget(&self, name: &str) {
        self.handles.remove(&repository_key(name));
    }
}

/// Repository discovery options derived from catalog settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub only_bare: bool,
    pub search_subfolders: bool,
    /// Maximum folder depth below the root, negative for unlimited.
    pub depth: i32,
    /// Glob patterns of relative paths to skip.
    pub exclusions: Vec<String>,
}

impl From<&CatalogSettings> for ScanOptions {
    fn from(settings: &CatalogSettings) -> Self {
        Self {
            only_bare: settings.only_access_bare_repositories,
            search_subfolders: settings.search_repositories_subfolders,
            depth: settings.search_recursion_depth,
            exclusions: settings.search_exclusions.clone(),
        }
    }
}

/// Result of updating one tracking ref during a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefUpdateResult {
    New,
    FastForward,
    Forced,
    NoChange,
    Rejected,
    /// Ref removed because it no longer exists on the remote. Only seen when
    /// the repository's own git config enables pruning.
    Deleted,
}

/// A local ref moved by a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRefUpdate {
    pub remote_name: String,
    pub local_name: String,
    pub old_id: Option<String>,
    pub new_id: Option<String>,
    pub result: RefUpdateResult,
}

impl TrackingRefUpdate {
    /// Abbreviated old object id, or "" when absent.
    pub fn old_short(&self) -> &str {
        abbreviate(self.old_id.as_deref())
    }

    /// Abbreviated new object id, or "" when absent.
    pub fn new_short(&self) -> &str {
        abbreviate(self.new_id.as_deref())
    }
}

fn abbreviate(id: Option<&str>) -> &str {
    match id {
        Some(id) => &id[..id.len().min(7)],
        None => "",
    }
}

/// Basic-auth credentials for a fetch.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Extracts inline credentials from a remote URL. Both user and password
    /// must be present.
    pub fn from_url(remote_url: &str) -> Option<Self> {
        let url = Url::parse(remote_url).ok()?;
        let password = url.password()?;
        if url.username().is_empty() {
            return None;
        }
        Some(Self {
            username: url.username().to_string(),
            password: password.to_string(),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A configured remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub mirror: bool,
    /// Fetch refspecs such as `+refs/heads/*:refs/remotes/origin/*`.
    #[serde(default)]
    pub fetch: Vec<String>,
}

/// Most recent change to a repository's refs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastChange {
    pub when: DateTime<Utc>,
    pub author: Option<String>,
}

/// One data point of repository activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub count: f64,
    pub tag: f64,
}

impl Metric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: 0.0,
            tag: 0.0,
        }
    }
}

/// Per-repository durable configuration.
///
/// Reads are served from the loaded document; `is_outdated` compares it
/// against the backing file without reloading.
pub trait ConfigStore: Send {
    fn get_string(&self, field: &str) -> Option<String>;
    fn get_bool(&self, field: &str, default: bool) -> bool;
    fn get_int(&self, field: &str, default: i64) -> i64;
    fn get_string_list(&self, field: &str) -> Vec<String>;

    fn set_string(&mut self, field: &str, value: &str);
    fn set_bool(&mut self, field: &str, value: bool);
    fn set_int(&mut self, field: &str, value: i64);
    fn set_string_list(&mut self, field: &str, values: &[String]);
    fn unset(&mut self, field: &str);

    fn custom_fields(&self) -> BTreeMap<String, String>;
    /// Replaces the custom-field section.
    fn set_custom_fields(&mut self, fields: &BTreeMap<String, String>);

    fn remotes(&self) -> Vec<RemoteConfig>;
    fn set_remote(&mut self, remote: &RemoteConfig);

    fn save(&mut self) -> Result<()>;
    fn reload(&mut self) -> Result<()>;
    fn is_outdated(&self) -> bool;

    fn get_string_or(&self, field: &str, default: &str) -> String {
        self.get_string(field)
            .unwrap_or_else(|| default.to_string())
    }

    /// Stores `value`, or unsets the field when it is empty.
    fn set_or_unset(&mut self, field: &str, value: Option<&str>) {
        match value {
            Some(v) if !v.trim().is_empty() => self.set_string(field, v),
            _ => self.unset(field),
        }
    }
}

/// Repository storage engine.
pub trait StorageBackend: Send + Sync {
    /// Folder holding every repository.
    fn root(&self) -> &Path;
    fn exists(&self, name: &str) -> bool;
    /// Discovers repository names relative to the root.
    fn scan(&self, options: &ScanOptions) -> Vec<String>;

    fn open(&self, name: &str) -> Option<StorageHandle>;
    fn close(&self, handle: &StorageHandle) -> Result<()>;
    /// Registered handle for `name` without opening it.
    fn handle(&self, name: &str) -> Option<StorageHandle>;
    fn use_count(&self, name: &str) -> usize;

    fn is_bare(&self, handle: &StorageHandle) -> bool;
    fn head_ref(&self, handle: &StorageHandle) -> Option<String>;
    fn set_head_ref(&self, handle: &StorageHandle, target: &str) -> Result<()>;
    fn last_change(&self, handle: &StorageHandle) -> LastChange;
    fn has_commits(&self, handle: &StorageHandle) -> bool;
    fn directory_size_bytes(&self, handle: &StorageHandle) -> u64;
    fn config(&self, handle: &StorageHandle) -> Result<Box<dyn ConfigStore>>;
    fn read_description(&self, handle: &StorageHandle) -> Option<String>;
    fn write_description(&self, handle: &StorageHandle, description: &str) -> Result<()>;

    fn create(&self, name: &str, shared: bool) -> Result<()>;
    fn rename(&self, from: &str, to: &str) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;

    fn fetch(
        &self,
        handle: &StorageHandle,
        remote: &RemoteConfig,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<TrackingRefUpdate>>;
    /// Drops malformed fetch refspecs. Returns true if anything changed.
    fn repair_fetch_specs(&self, handle: &StorageHandle) -> Result<bool>;
    fn collect_garbage(&self, handle: &StorageHandle) -> Result<()>;
    /// Daily commit counts, most recent first. Errors yield an empty list.
    fn activity_metrics(&self, handle: &StorageHandle, max_commits: i32) -> Vec<Metric>;
}

/// A handle opened on a backend and closed again when dropped.
pub struct OpenRepository<'a> {
    backend: &'a dyn StorageBackend,
    handle: StorageHandle,
}

impl<'a> OpenRepository<'a> {
    pub fn open(backend: &'a dyn StorageBackend, name: &str) -> Option<Self> {
        let handle = backend.open(name)?;
        Some(Self { backend, handle })
    }

    pub fn handle(&self) -> &StorageHandle {
        &self.handle
    }
}

impl Deref for OpenRepository<'_> {
    type Target = StorageHandle;

    fn deref(&self) -> &StorageHandle {
        &self.handle
    }
}

impl Drop for OpenRepository<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.close(&self.handle) {
            warn!(repository = %self.handle.name(), error = %e, "failed to close repository");
        }
    }
}
