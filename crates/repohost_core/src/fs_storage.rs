//! Directory-per-repository storage backend.

use crate::error::{CatalogError, Result};
use crate::fs_config::{ConfigDoc, FsConfig, CONFIG_FILE};
use crate::git_cli::{self, Fetcher, GitCliFetcher, DEFAULT_MIRROR_REFSPEC};
use crate::names::{fix_name, repository_key, validate_name, with_dot_git};
use crate::storage::{
    ConfigStore, Credentials, HandleRegistry, LastChange, Metric, RemoteConfig, ScanOptions,
    StorageBackend, StorageHandle, TrackingRefUpdate,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

const DEFAULT_DESCRIPTION: &str = "Unnamed repository; edit this file 'description' to name the repository.";

/// True if `dir` holds a git directory layout.
fn is_git_dir(dir: &Path) -> bool {
    dir.join("HEAD").is_file() && dir.join("objects").is_dir() && dir.join("refs").is_dir()
}

/// Writes an empty bare repository layout into `dir`.
pub(crate) fn write_bare_layout(dir: &Path, shared: bool) -> std::io::Result<()> {
    for sub in ["objects/info", "objects/pack", "refs/heads", "refs/tags", "info"] {
        fs::create_dir_all(dir.join(sub))?;
    }
    fs::write(dir.join("HEAD"), "ref: refs/heads/master\n")?;
    let mut config = String::from("[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = true\n");
    if shared {
        config.push_str("\tsharedrepository = 1\n");
    }
    fs::write(dir.join("config"), config)?;
    fs::write(dir.join("description"), format!("{}\n", DEFAULT_DESCRIPTION))?;
    Ok(())
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Location of one repository on disk.
struct Located {
    name: String,
    /// Directory that is renamed or removed as a unit.
    repo_dir: PathBuf,
    git_dir: PathBuf,
}

/// Storage backend keeping each repository in its own directory under a root
/// folder.
///
/// Bare repositories are directories with a git layout; non-bare ones hold a
/// `.git` directory. Catalog configuration lives in `repohost.toml` inside the
/// git directory. Configuration documents are cached per repository and
/// shared by every [`ConfigStore`] view handed out for it.
pub struct FsStorage {
    root: PathBuf,
    handles: HandleRegistry,
    configs: DashMap<String, Arc<Mutex<ConfigDoc>>>,
    fetcher: Box<dyn Fetcher>,
}

impl FsStorage {
    /// Creates a backend rooted at `root`, fetching through the `git` binary.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(root, Box::new(GitCliFetcher))
    }

    pub fn with_fetcher(root: impl Into<PathBuf>, fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            root: root.into(),
            handles: HandleRegistry::new(),
            configs: DashMap::new(),
            fetcher,
        }
    }

    fn locate(&self, name: &str) -> Option<Located> {
        let fixed = fix_name(name);
        validate_name(&fixed).ok()?;
        let mut candidates = vec![fixed.clone()];
        let dotted = with_dot_git(&fixed);
        if dotted != fixed {
            candidates.push(dotted);
        }
        candidates.into_iter().find_map(|candidate| {
            let dir = self.root.join(&candidate);
            if is_git_dir(&dir) {
                Some(Located {
                    name: candidate,
                    repo_dir: dir.clone(),
                    git_dir: dir,
                })
            } else if is_git_dir(&dir.join(".git")) {
                Some(Located {
                    name: candidate,
                    git_dir: dir.join(".git"),
                    repo_dir: dir,
                })
            } else {
                None
            }
        })
    }

    fn forget(&self, name: &str) {
        self.handles.forget(name);
        self.configs.remove(&repository_key(name));
    }

    fn ref_files(git_dir: &Path) -> impl Iterator<Item = PathBuf> + '_ {
        ["refs/heads", "refs/tags"]
            .into_iter()
            .flat_map(move |sub| WalkDir::new(git_dir.join(sub)).into_iter())
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
    }

    fn packed_heads(git_dir: &Path) -> bool {
        fs::read_to_string(git_dir.join("packed-refs"))
            .map(|content| content.lines().any(|l| l.contains(" refs/heads/")))
            .unwrap_or(false)
    }

    /// Author of the most recent reflog entry.
    fn reflog_author(git_dir: &Path) -> Option<String> {
        let log = fs::read_to_string(git_dir.join("logs/HEAD")).ok()?;
        let line = log.lines().rev().find(|l| !l.trim().is_empty())?;
        let header = line.split('\t').next()?;
        let identity = header.splitn(3, ' ').nth(2)?;
        let name = identity.split(" <").next()?.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

impl StorageBackend for FsStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exists(&self, name: &str) -> bool {
        self.locate(name).is_some()
    }

    fn scan(&self, options: &ScanOptions) -> Vec<String> {
        if !self.root.is_dir() {
            return Vec::new();
        }
        let exclusions: Vec<Pattern> = options
            .exclusions
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "ignoring invalid search exclusion");
                    None
                }
            })
            .collect();
        let max_depth = if !options.search_subfolders {
            1
        } else if options.depth < 0 {
            usize::MAX
        } else {
            options.depth as usize + 1
        };

        let mut names = Vec::new();
        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry during scan");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if exclusions.iter().any(|p| p.matches(&relative)) {
                walker.skip_current_dir();
                continue;
            }
            if is_git_dir(entry.path()) {
                names.push(relative);
                walker.skip_current_dir();
            } else if is_git_dir(&entry.path().join(".git")) {
                if !options.only_bare {
                    names.push(relative);
                }
                walker.skip_current_dir();
            }
        }
        names
    }

    fn open(&self, name: &str) -> Option<StorageHandle> {
        let located = self.locate(name)?;
        Some(self.handles.open(&located.name, located.git_dir))
    }

    fn close(&self, handle: &StorageHandle) -> Result<()> {
        self.handles.close(handle)
    }

    fn handle(&self, name: &str) -> Option<StorageHandle> {
        self.handles.get(name)
    }

    fn use_count(&self, name: &str) -> usize {
        self.handles.use_count(name)
    }

    fn is_bare(&self, handle: &StorageHandle) -> bool {
        handle
            .git_dir()
            .file_name()
            .map(|n| n != ".git")
            .unwrap_or(true)
    }

    fn head_ref(&self, handle: &StorageHandle) -> Option<String> {
        let content = fs::read_to_string(handle.git_dir().join("HEAD")).ok()?;
        let content = content.trim();
        let target = content.strip_prefix("ref:").map(str::trim).unwrap_or(content);
        (!target.is_empty()).then(|| target.to_string())
    }

    fn set_head_ref(&self, handle: &StorageHandle, target: &str) -> Result<()> {
        let content = if target.starts_with("refs/") {
            format!("ref: {}\n", target)
        } else {
            format!("{}\n", target)
        };
        fs::write(handle.git_dir().join("HEAD"), content).map_err(|e| CatalogError::Persistence {
            repository: handle.name().to_string(),
            reason: format!("failed to update HEAD: {}", e),
        })
    }

    fn last_change(&self, handle: &StorageHandle) -> LastChange {
        let git_dir = handle.git_dir();
        let newest_ref = Self::ref_files(git_dir)
            .chain(std::iter::once(git_dir.join("packed-refs")))
            .filter_map(|path| modified(&path))
            .max();
        let when = newest_ref
            .or_else(|| modified(git_dir))
            .map(to_utc)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        LastChange {
            when,
            author: Self::reflog_author(git_dir),
        }
    }

    fn has_commits(&self, handle: &StorageHandle) -> bool {
        let git_dir = handle.git_dir();
        Self::ref_files(git_dir)
            .any(|path| path.starts_with(git_dir.join("refs/heads")))
            || Self::packed_heads(git_dir)
    }

    fn directory_size_bytes(&self, handle: &StorageHandle) -> u64 {
        WalkDir::new(handle.git_dir())
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    fn config(&self, handle: &StorageHandle) -> Result<Box<dyn ConfigStore>> {
        let key = repository_key(handle.name());
        if let Some(doc) = self.configs.get(&key) {
            return Ok(Box::new(FsConfig::new(doc.value().clone())));
        }
        let doc = ConfigDoc::load(handle.name(), handle.git_dir().join(CONFIG_FILE))?;
        let doc = self
            .configs
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(doc)))
            .value()
            .clone();
        Ok(Box::new(FsConfig::new(doc)))
    }

    fn read_description(&self, handle: &StorageHandle) -> Option<String> {
        let content = fs::read_to_string(handle.git_dir().join("description")).ok()?;
        let description = content.trim();
        if description.is_empty() || description.to_lowercase().starts_with("unnamed repository") {
            None
        } else {
            Some(description.to_string())
        }
    }

    fn write_description(&self, handle: &StorageHandle, description: &str) -> Result<()> {
        fs::write(handle.git_dir().join("description"), format!("{}\n", description)).map_err(|e| {
            CatalogError::Persistence {
                repository: handle.name().to_string(),
                reason: format!("failed to write description: {}", e),
            }
        })
    }

    fn create(&self, name: &str, shared: bool) -> Result<()> {
        validate_name(name)?;
        let fixed = fix_name(name);
        let dir = self.root.join(&fixed);
        if dir.exists() {
            return Err(CatalogError::Conflict {
                existing: fixed.clone(),
                requested: fixed,
            });
        }
        write_bare_layout(&dir, shared).map_err(|e| CatalogError::Persistence {
            repository: fixed.clone(),
            reason: format!("failed to create repository: {}", e),
        })?;
        debug!(repository = %fixed, "created repository");
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        validate_name(to)?;
        let source = self
            .locate(from)
            .ok_or_else(|| CatalogError::RepositoryNotFound(from.to_string()))?;
        let target = fix_name(to);
        let target_dir = self.root.join(&target);
        // A case-only rename targets the same directory on case-insensitive filesystems.
        if target_dir.exists() && repository_key(&target) != repository_key(&source.name) {
            return Err(CatalogError::Conflict {
                existing: source.name,
                requested: target,
            });
        }
        let persistence = |e: std::io::Error| CatalogError::Persistence {
            repository: source.name.clone(),
            reason: format!("failed to move to {}: {}", target, e),
        };
        if let Some(parent) = target_dir.parent() {
            fs::create_dir_all(parent).map_err(persistence)?;
        }
        fs::rename(&source.repo_dir, &target_dir).map_err(persistence)?;
        self.forget(&source.name);
        self.forget(&target);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let located = self
            .locate(name)
            .ok_or_else(|| CatalogError::RepositoryNotFound(name.to_string()))?;
        fs::remove_dir_all(&located.repo_dir).map_err(|e| CatalogError::Persistence {
            repository: located.name.clone(),
            reason: format!("failed to remove: {}", e),
        })?;
        self.forget(&located.name);
        Ok(())
    }

    fn fetch(
        &self,
        handle: &StorageHandle,
        remote: &RemoteConfig,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<TrackingRefUpdate>> {
        self.fetcher
            .fetch(handle.git_dir(), remote, credentials)
            .map_err(|e| match e {
                CatalogError::Fetch { remote, reason, .. } => CatalogError::Fetch {
                    repository: handle.name().to_string(),
                    remote,
                    reason,
                },
                other => other,
            })
    }

    fn repair_fetch_specs(&self, handle: &StorageHandle) -> Result<bool> {
        let mut config = self.config(handle)?;
        let mut changed = false;
        for mut remote in config.remotes() {
            let valid: Vec<String> = remote
                .fetch
                .iter()
                .filter(|spec| git_cli::is_valid_refspec(spec))
                .cloned()
                .collect();
            let repaired = if valid.is_empty() && remote.mirror {
                vec![DEFAULT_MIRROR_REFSPEC.to_string()]
            } else {
                valid
            };
            if repaired != remote.fetch {
                debug!(repository = %handle.name(), remote = %remote.name, "repaired fetch refspecs");
                remote.fetch = repaired;
                config.set_remote(&remote);
                changed = true;
            }
        }
        if changed {
            config.save()?;
        }
        Ok(changed)
    }

    fn collect_garbage(&self, handle: &StorageHandle) -> Result<()> {
        git_cli::collect_garbage(handle.git_dir())
    }

    fn activity_metrics(&self, handle: &StorageHandle, max_commits: i32) -> Vec<Metric> {
        git_cli::daily_activity(handle.git_dir(), max_commits).unwrap_or_else(|e| {
            warn!(repository = %handle.name(), error = %e, "failed to compute activity metrics");
            Vec::new()
        })
    }
}
