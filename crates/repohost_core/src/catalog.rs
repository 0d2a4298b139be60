//! The repository catalog.
//!
//! The catalog keeps one canonical [`RepositoryRecord`] per repository key and
//! hands out clones of it. Records are loaded from the per-repository config
//! on first access, refreshed cheaply on later accesses, and fully reloaded
//! when the config file changes behind our back.
//!
//! Derived values (sizes, activity metrics) are cached by repository key and
//! stamped with the record's `last_change`; any change to the refs makes them
//! stale.

use crate::byte_format::format_bytes;
use crate::config::Settings;
use crate::error::{CatalogError, Result};
use crate::fork::{self, ForkNode, RecordSource};
use crate::gc::GcMonitor;
use crate::identity::{IdentityDirectory, UserModel};
use crate::names::{
    first_path_element, fix_name, repository_key, sort_repository_names, validate_name,
    with_dot_git, PersonalNamespace,
};
use crate::permission::RegistrantAccessPermission;
use crate::record::RepositoryRecord;
use crate::record_config::{self, LAST_GC, ORIGIN_REMOTE, ORIGIN_REPOSITORY};
use crate::resolver::PermissionResolver;
use crate::stamped_cache::TimestampedCache;
use crate::storage::{Metric, OpenRepository, ScanOptions, StorageBackend, StorageHandle};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fs;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Central registry of hosted repositories.
pub struct RepositoryCatalog {
    settings: Arc<RwLock<Settings>>,
    storage: Arc<dyn StorageBackend>,
    resolver: PermissionResolver,
    gc: Arc<dyn GcMonitor>,
    records: DashMap<String, RepositoryRecord>,
    size_cache: TimestampedCache<u64>,
    metrics_cache: TimestampedCache<Vec<Metric>>,
    list_checksum: Mutex<Option<String>>,
}

impl RepositoryCatalog {
    pub fn new(
        settings: Arc<RwLock<Settings>>,
        storage: Arc<dyn StorageBackend>,
        directory: Arc<dyn IdentityDirectory>,
        gc: Arc<dyn GcMonitor>,
    ) -> Self {
        let namespace = {
            let settings = settings.read().unwrap_or_else(PoisonError::into_inner);
            PersonalNamespace::new(&settings.catalog.user_repository_prefix)
        };
        Self {
            settings,
            storage,
            resolver: PermissionResolver::new(directory, namespace),
            gc,
            records: DashMap::new(),
            size_cache: TimestampedCache::new(),
            metrics_cache: TimestampedCache::new(),
            list_checksum: Mutex::new(None),
        }
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn namespace(&self) -> &PersonalNamespace {
        self.resolver.namespace()
    }

    pub fn gc_monitor(&self) -> &Arc<dyn GcMonitor> {
        &self.gc
    }

    /// Checks that the repositories folder exists and is writable.
    pub fn confirm_write_access(&self) -> Result<()> {
        let root = self.storage.root();
        let marker = root.join(format!(".write-test-{}", std::process::id()));
        fs::create_dir_all(root)
            .and_then(|_| fs::write(&marker, b""))
            .and_then(|_| fs::remove_file(&marker))
            .map_err(|e| {
                error!(folder = %root.display(), error = %e, "repositories folder is not writable");
                CatalogError::Io(e)
            })
    }

    /// Sorted names of every repository.
    ///
    /// Rescans storage when list caching is off, when nothing is cached yet,
    /// or when the list-affecting settings changed since the last call.
    pub fn list(&self) -> Vec<String> {
        let settings = self.settings();
        let valid = self.is_valid_list(&settings);
        if !settings.catalog.cache_repository_list || self.records.is_empty() || !valid {
            let started = Instant::now();
            let mut names = self.storage.scan(&ScanOptions::from(&settings.catalog));
            if !settings.catalog.cache_repository_list {
                sort_repository_names(&mut names);
                return names;
            }

            for name in &names {
                self.get(name);
            }
            self.rebuild_fork_sets();
            info!(
                count = self.records.len(),
                with_sizes = settings.catalog.show_repository_sizes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "repositories identified"
            );
        }

        let mut names: Vec<String> = self.records.iter().map(|e| e.value().name.clone()).collect();
        sort_repository_names(&mut names);
        names
    }

    /// Compares the list settings checksum with the last one seen, clearing
    /// the list cache when it changed.
    fn is_valid_list(&self, settings: &Settings) -> bool {
        let checksum = settings.list_checksum();
        let mut last = self
            .list_checksum
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let valid = last.as_deref() == Some(checksum.as_str());
        *last = Some(checksum);
        if !valid && !self.records.is_empty() {
            info!("repository list settings changed, clearing repository list cache");
            self.records.clear();
        }
        valid
    }

    fn rebuild_fork_sets(&self) {
        let links: Vec<(String, String)> = self
            .records
            .iter()
            .filter_map(|e| {
                let origin = e.value().origin_repository.as_deref()?;
                (!origin.is_empty()).then(|| (repository_key(origin), e.value().name.clone()))
            })
            .collect();
        for (origin_key, fork) in links {
            if let Some(mut origin) = self.records.get_mut(&origin_key) {
                origin.add_fork(&fork);
            }
        }
    }

    /// Caches a record and links it into its origin's fork set.
    fn add_to_cache(&self, record: RepositoryRecord) {
        if !self.settings().catalog.cache_repository_list {
            return;
        }
        let name = record.name.clone();
        let origin = record
            .origin_repository
            .clone()
            .filter(|o| !o.is_empty());
        self.records.insert(repository_key(&name), record);
        if let Some(origin) = origin {
            if let Some(mut parent) = self.records.get_mut(&repository_key(&origin)) {
                parent.add_fork(&name);
            }
        }
    }

    /// Opens a repository unless the garbage collector owns it.
    pub fn open(&self, name: &str) -> Option<OpenRepository<'_>> {
        let name = fix_name(name);
        if self.gc.is_collecting_garbage(&name) {
            warn!(repository = %name, "rejecting request, busy collecting garbage");
            return None;
        }
        OpenRepository::open(self.storage.as_ref(), &name)
    }

    /// Returns a copy of the record for `name`, or `None` if it does not exist.
    pub fn get(&self, name: &str) -> Option<RepositoryRecord> {
        let fixed = fix_name(name);
        let key = repository_key(&fixed);
        let cached = self.records.get(&key).map(|e| e.value().clone());
        let Some(cached) = cached else {
            let record = self.load_record(&fixed)?;
            self.add_to_cache(record.clone());
            return Some(record);
        };

        if self.gc.is_collecting_garbage(&cached.name) {
            let mut copy = cached;
            copy.is_collecting_garbage = true;
            return Some(copy);
        }

        let Some(repo) = self.open(&cached.name) else {
            self.records.remove(&key);
            error!(repository = %fixed, "repository is missing, removing from cache");
            return None;
        };

        let outdated = match self.storage.config(&repo) {
            Ok(config) => config.is_outdated(),
            Err(e) => {
                warn!(repository = %cached.name, error = %e, "failed to read repository config");
                false
            }
        };
        if outdated {
            debug!(repository = %cached.name, "config changed, reloading record");
            drop(repo);
            let mut record = self.load_record(&cached.name)?;
            record.forks = cached.forks;
            self.records.remove(&key);
            self.add_to_cache(record.clone());
            return Some(record);
        }

        let mut record = cached;
        if !record.has_commits {
            // repositories only ever gain commits
            record.has_commits = self.storage.has_commits(&repo);
        }
        self.update_last_change_fields(&repo, &mut record);
        if let Some(mut entry) = self.records.get_mut(&key) {
            entry.has_commits |= record.has_commits;
            entry.last_change = record.last_change;
            entry.last_change_author = record.last_change_author.clone();
            entry.size = record.size.clone();
        }
        Some(record)
    }

    /// Returns the record if the user, or the anonymous user, may view it.
    pub fn get_for_user(&self, user: Option<&UserModel>, name: &str) -> Option<RepositoryRecord> {
        let record = self.get(name)?;
        let anonymous = UserModel::anonymous();
        let user = user.unwrap_or(&anonymous);
        user.can_view(&record, self.namespace()).then_some(record)
    }

    /// Copies of every record in list order.
    pub fn records(&self) -> Vec<RepositoryRecord> {
        let started = Instant::now();
        let records: Vec<_> = self.list().iter().filter_map(|n| self.get(n)).collect();
        debug!(
            count = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "repository records loaded"
        );
        records
    }

    /// Records the user may view. Empty repositories are only listed for
    /// users who could push to them.
    pub fn records_for_user(&self, user: Option<&UserModel>) -> Vec<RepositoryRecord> {
        let anonymous = UserModel::anonymous();
        let ns = self.namespace();
        let records: Vec<_> = self
            .list()
            .iter()
            .filter_map(|n| self.get_for_user(user, n))
            .filter(|record| {
                record.has_commits
                    || anonymous.can_push(record, ns)
                    || user.map(|u| u.can_push(record, ns)).unwrap_or(false)
            })
            .collect();
        debug!(
            count = records.len(),
            user = user.map(|u| u.username.as_str()).unwrap_or("anonymous"),
            "repository records loaded for user"
        );
        records
    }

    fn cached_records(&self) -> Vec<RepositoryRecord> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }

    /// True if the repository exists. Case-insensitive checks use the list
    /// cache when caching is on.
    pub fn has_repository(&self, name: &str, case_sensitive: bool) -> bool {
        if !case_sensitive && self.settings().catalog.cache_repository_list {
            return self.records.contains_key(&repository_key(name));
        }
        self.storage.exists(name)
    }

    fn load_record(&self, name: &str) -> Option<RepositoryRecord> {
        let repo = self.open(name)?;
        let settings = self.settings();
        let mut record = RepositoryRecord::new(repo.name());
        record.is_bare = self.storage.is_bare(&repo);
        record.project_path = first_path_element(name).to_string();

        match self.storage.config(&repo) {
            Ok(mut config) => {
                if config.is_outdated() {
                    if let Err(e) = config.reload() {
                        warn!(repository = %record.name, error = %e, "failed to reload repository config");
                    }
                }
                record_config::read_record(&mut record, config.as_ref(), &settings);
            }
            Err(e) => {
                warn!(repository = %record.name, error = %e, "failed to read repository config, using defaults")
            }
        }

        if record.description.is_empty() {
            if let Some(description) = self.storage.read_description(&repo) {
                record.description = description;
            }
        }
        record.head = self.storage.head_ref(&repo);
        if record.merge_to.is_none() {
            record.merge_to = record.head.clone();
        }
        record.has_commits = self.storage.has_commits(&repo);
        self.update_last_change_fields(&repo, &mut record);
        self.infer_fork_origin(&repo, &mut record, &settings);
        Some(record)
    }

    /// A repository cloned from a `file://` URL inside the repositories
    /// folder is treated as a fork of that repository.
    fn infer_fork_origin(&self, handle: &StorageHandle, record: &mut RepositoryRecord, settings: &Settings) {
        if record.is_fork() {
            return;
        }
        let Some(origin) = record.origin.as_deref().filter(|o| o.starts_with("file://")) else {
            return;
        };
        let Some(folder) = Url::parse(origin).ok().and_then(|u| u.to_file_path().ok()) else {
            warn!(repository = %record.name, origin, "failed to determine fork origin");
            return;
        };
        let (Ok(root), Ok(folder)) = (fs::canonicalize(self.storage.root()), fs::canonicalize(&folder)) else {
            return;
        };
        let Ok(relative) = folder.strip_prefix(&root) else {
            return;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if relative.is_empty() {
            return;
        }

        record.origin_repository = Some(relative.to_lowercase());
        if let Err(e) = self.persist(handle, record, settings) {
            error!(repository = %record.name, error = %e, "failed to persist fork origin");
        }
    }

    fn persist(&self, handle: &StorageHandle, record: &RepositoryRecord, settings: &Settings) -> Result<()> {
        let mut config = self.storage.config(handle)?;
        record_config::write_record(record, config.as_mut(), settings);
        config.save()
    }

    /// Refreshes the last change fields and, if enabled, the size.
    fn update_last_change_fields(&self, handle: &StorageHandle, record: &mut RepositoryRecord) -> u64 {
        let last_change = self.storage.last_change(handle);
        record.last_change = last_change.when;
        record.last_change_author = last_change.author;
        self.size_of(record, handle)
    }

    /// On-disk size of the repository in bytes, also stored formatted on
    /// the record. Returns 0 and clears the size when sizes are disabled or
    /// skipped for this repository.
    pub fn size_of(&self, record: &mut RepositoryRecord, handle: &StorageHandle) -> u64 {
        if !self.settings().catalog.show_repository_sizes || record.skip_size_calculation {
            record.size = None;
            return 0;
        }
        let key = repository_key(&record.name);
        let size = match self.size_cache.get_current(&key, &record.last_change) {
            Some(size) => size,
            None => {
                let size = self.storage.directory_size_bytes(handle);
                self.size_cache.update(&key, record.last_change, size);
                size
            }
        };
        record.size = Some(format_bytes(size));
        size
    }

    /// Daily activity of the repository. Every call returns a fresh list.
    pub fn default_metrics(&self, record: &RepositoryRecord, handle: &StorageHandle) -> Vec<Metric> {
        let key = repository_key(&record.name);
        if let Some(metrics) = self.metrics_cache.get_current(&key, &record.last_change) {
            return metrics;
        }
        let metrics = self
            .storage
            .activity_metrics(handle, record.max_activity_commits);
        self.metrics_cache
            .update(&key, record.last_change, metrics.clone());
        metrics
    }

    /// Most recent change across all repositories.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.list()
            .iter()
            .filter_map(|name| self.open(name))
            .map(|repo| self.storage.last_change(&repo).when)
            .max()
    }

    fn clear_metadata(&self, name: &str) {
        let key = repository_key(name);
        self.size_cache.remove(&key);
        self.metrics_cache.remove(&key);
    }

    /// Drops everything cached for one repository and reloads it.
    pub fn reset_repository_cache(&self, name: &str) {
        self.records.remove(&repository_key(name));
        self.clear_metadata(name);
        self.get(name);
    }

    /// Drops every cached record and derived value.
    pub fn reset_list_cache(&self) {
        info!("repository cache reset");
        self.records.clear();
        self.size_cache.clear();
        self.metrics_cache.clear();
    }

    /// Creates, edits or renames a repository and returns the stored record.
    ///
    /// Created and renamed repositories always carry the `.git` suffix. A
    /// rename moves storage, permissions and fork links; failures after the
    /// move are not rolled back.
    pub fn update_record(
        &self,
        old_name: &str,
        mut record: RepositoryRecord,
        is_create: bool,
    ) -> Result<RepositoryRecord> {
        if self.gc.is_collecting_garbage(old_name) {
            return Err(CatalogError::Busy {
                repository: old_name.to_string(),
            });
        }
        let settings = self.settings();
        record.set_name(&fix_name(&record.name));
        let project = first_path_element(&record.name).to_string();
        if !project.is_empty() && project.eq_ignore_ascii_case(&settings.catalog.repository_root_group_name) {
            let stripped = record.name[project.len() + 1..].to_string();
            record.set_name(&stripped);
        }
        validate_name(&record.name)?;

        if is_create {
            record.set_name(&with_dot_git(&record.name));
            if self.has_repository(&record.name, false) || self.key_on_disk(&record.name) {
                return Err(CatalogError::Conflict {
                    existing: record.name.clone(),
                    requested: record.name.clone(),
                });
            }
            info!(repository = %record.name, "creating repository");
            self.storage
                .create(&record.name, settings.catalog.create_repositories_shared)?;
        } else if !old_name.eq_ignore_ascii_case(&record.name) {
            record.set_name(&with_dot_git(&record.name));
            self.rename(old_name, &record)?;
        } else {
            info!(repository = %record.name, "editing repository");
        }

        let repo = self
            .open(&record.name)
            .ok_or_else(|| CatalogError::RepositoryNotFound(record.name.clone()))?;
        self.persist(&repo, &record, &settings)?;
        // An empty description truncates the file so it is not read back later.
        if self.storage.read_description(&repo).unwrap_or_default() != record.description {
            self.storage.write_description(&repo, &record.description)?;
        }
        let current_head = self.storage.head_ref(&repo);
        if let Some(head) = record.head.as_deref().filter(|h| !h.is_empty()) {
            if current_head.as_deref() != Some(head) {
                info!(
                    repository = %record.name,
                    from = current_head.as_deref().unwrap_or(""),
                    to = head,
                    "relinking HEAD"
                );
                self.storage.set_head_ref(&repo, head)?;
                self.clear_metadata(&record.name);
            }
        }
        drop(repo);

        self.records.remove(&repository_key(old_name));
        let mut stored = self.load_record(&record.name).unwrap_or_else(|| record.clone());
        stored.forks = record.forks;
        self.add_to_cache(stored.clone());
        Ok(stored)
    }

    /// True if any folder in storage shares the repository key of `name`,
    /// whatever the list settings hide and whatever is cached.
    fn key_on_disk(&self, name: &str) -> bool {
        if self.storage.exists(name) {
            return true;
        }
        let key = repository_key(name);
        let everything = ScanOptions {
            only_bare: false,
            search_subfolders: true,
            depth: -1,
            exclusions: Vec::new(),
        };
        self.storage
            .scan(&everything)
            .iter()
            .any(|existing| repository_key(existing) == key)
    }

    fn rename(&self, old_name: &str, record: &RepositoryRecord) -> Result<()> {
        let conflict = || CatalogError::Conflict {
            existing: old_name.to_string(),
            requested: record.name.clone(),
        };
        let case_only = repository_key(old_name) == repository_key(&record.name);
        if !case_only && self.key_on_disk(&record.name) {
            return Err(conflict());
        }

        self.close_all(old_name)?;
        self.storage.rename(old_name, &record.name)?;
        self.resolver
            .directory()
            .rename_repository_role(old_name, &record.name)?;

        for fork in &record.forks {
            if let Err(e) = self.relink_fork(fork, old_name, &record.name) {
                error!(fork = %fork, error = %e, "failed to update fork origin");
            }
        }
        if let Some(origin) = record.origin_repository.as_deref().filter(|o| !o.is_empty()) {
            if let Some(mut parent) = self.records.get_mut(&repository_key(origin)) {
                let old_key = repository_key(old_name);
                parent.forks.retain(|f| repository_key(f) != old_key);
                parent.add_fork(&record.name);
            }
        }
        self.clear_metadata(old_name);
        info!(from = old_name, to = %record.name, "renamed repository");
        Ok(())
    }

    /// Points a fork's origin remote and origin repository at a new name.
    fn relink_fork(&self, fork: &str, old_name: &str, new_name: &str) -> Result<()> {
        let repo = self
            .open(fork)
            .ok_or_else(|| CatalogError::RepositoryNotFound(fork.to_string()))?;
        let mut config = self.storage.config(&repo)?;
        if let Some(mut origin) = config.remotes().into_iter().find(|r| r.name == ORIGIN_REMOTE) {
            origin.url = origin.url.replace(old_name, new_name);
            config.set_remote(&origin);
        }
        config.set_string(ORIGIN_REPOSITORY, new_name);
        config.save()?;
        if let Some(mut cached) = self.records.get_mut(&repository_key(fork)) {
            cached.origin_repository = Some(new_name.to_string());
        }
        Ok(())
    }

    /// True if policy allows deleting the repository.
    pub fn can_delete(&self, record: &RepositoryRecord) -> bool {
        self.settings().catalog.allow_deleting_non_empty_repositories || !record.has_commits
    }

    /// Deletes a repository and its permission roles.
    pub fn delete(&self, name: &str) -> Result<()> {
        let record = self
            .get(name)
            .ok_or_else(|| CatalogError::RepositoryNotFound(name.to_string()))?;
        if record.is_collecting_garbage {
            return Err(CatalogError::Busy {
                repository: record.name,
            });
        }
        if !self.can_delete(&record) {
            warn!(repository = %record.name, "refusing to delete non-empty repository");
            return Err(CatalogError::DeleteRefused(record.name));
        }

        self.close_all(&record.name)?;
        self.clear_metadata(&record.name);
        if let Some((_, removed)) = self.records.remove(&repository_key(&record.name)) {
            if !removed.forks.is_empty() {
                self.reset_list_cache();
            }
        }
        if let Some(origin) = record.origin_repository.as_deref().filter(|o| !o.is_empty()) {
            if let Some(mut parent) = self.records.get_mut(&repository_key(origin)) {
                let key = repository_key(&record.name);
                parent.forks.retain(|f| repository_key(f) != key);
            }
        }
        self.storage.remove(&record.name)?;
        self.resolver
            .directory()
            .delete_repository_role(&record.name)?;
        info!(repository = %record.name, "repository deleted");
        Ok(())
    }

    /// True if nobody but the caller holds the handle open, so a handle the
    /// caller opened once still counts as idle.
    pub fn is_idle(&self, handle: &StorageHandle) -> bool {
        handle.use_count() <= 1
    }

    /// Closes every outstanding open of `name`, as many times as it was opened.
    pub fn close_all(&self, name: &str) -> Result<()> {
        let Some(handle) = self.storage.handle(name) else {
            return Ok(());
        };
        let uses = handle.use_count();
        if uses > 0 {
            debug!(repository = %name, uses, "closing outstanding handles");
        }
        for _ in 0..uses {
            self.storage.close(&handle).map_err(|e| match e {
                CatalogError::CloseFailed { .. } => e,
                other => CatalogError::CloseFailed {
                    repository: name.to_string(),
                    reason: other.to_string(),
                },
            })?;
        }
        Ok(())
    }

    /// Closes every repository, logging failures.
    pub fn close_all_repositories(&self) {
        for name in self.list() {
            if let Err(e) = self.close_all(&name) {
                warn!(repository = %name, error = %e, "failed to close repository");
            }
        }
    }

    /// Stores the time of a completed garbage collection.
    pub(crate) fn record_garbage_collected(&self, name: &str, when: DateTime<Utc>) -> Result<()> {
        let repo = OpenRepository::open(self.storage.as_ref(), name)
            .ok_or_else(|| CatalogError::RepositoryNotFound(name.to_string()))?;
        let mut config = self.storage.config(&repo)?;
        config.set_string(LAST_GC, &when.to_rfc3339());
        config.save()?;
        if let Some(mut cached) = self.records.get_mut(&repository_key(name)) {
            cached.last_gc = when;
        }
        self.clear_metadata(name);
        Ok(())
    }

    /// Number of users who starred the repository.
    pub fn star_count(&self, record: &RepositoryRecord) -> usize {
        self.resolver.star_count(record)
    }

    /// Every repository permission the user effectively holds.
    pub fn effective_permissions(&self, user: &UserModel) -> Vec<RegistrantAccessPermission> {
        self.resolver
            .effective_permissions(user, &self.cached_records(), |name| self.has_repository(name, false))
    }

    pub fn registrants_for(&self, record: &RepositoryRecord) -> Vec<RegistrantAccessPermission> {
        self.resolver.registrants_for(record)
    }

    pub fn team_registrants_for(&self, record: &RepositoryRecord) -> Vec<RegistrantAccessPermission> {
        self.resolver.team_registrants_for(record)
    }

    /// The fork network containing `name`.
    pub fn network(&self, name: &str) -> Option<ForkNode> {
        fork::network(self, name)
    }

    /// Name of the user's fork in the network of `origin`.
    pub fn fork_of(&self, username: &str, origin: &str) -> Option<String> {
        if origin.is_empty() {
            return None;
        }
        fork::fork_of(self, username, origin, self.namespace())
    }

    pub fn has_fork(&self, username: &str, origin: &str) -> bool {
        self.fork_of(username, origin).is_some()
    }
}

impl RecordSource for RepositoryCatalog {
    fn record(&self, name: &str) -> Option<RepositoryRecord> {
        self.get(name)
    }

    fn names(&self) -> Vec<String> {
        self.list()
    }
}
