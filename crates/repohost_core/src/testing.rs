//! Test doubles shared by the unit tests.

use crate::error::{CatalogError, Result};
use crate::fs_storage::FsStorage;
use crate::git_cli::Fetcher;
use crate::storage::{
    ConfigStore, Credentials, LastChange, Metric, RemoteConfig, ScanOptions, StorageBackend,
    StorageHandle, TrackingRefUpdate,
};
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Fetcher that replays scripted results keyed by git directory name.
#[derive(Default, Clone)]
pub(crate) struct ScriptedFetcher {
    results: Arc<DashMap<String, Vec<TrackingRefUpdate>>>,
    failures: Arc<DashMap<String, String>>,
    calls: Arc<Mutex<Vec<(String, Option<Credentials>)>>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Scripts the updates returned for the repository directory `dir_name`.
    pub(crate) fn script(&self, dir_name: &str, updates: Vec<TrackingRefUpdate>) {
        self.results.insert(dir_name.to_string(), updates);
    }

    pub(crate) fn fail(&self, dir_name: &str, reason: &str) {
        self.failures.insert(dir_name.to_string(), reason.to_string());
    }

    /// Directory names fetched so far with the credentials used.
    pub(crate) fn calls(&self) -> Vec<(String, Option<Credentials>)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(
        &self,
        git_dir: &Path,
        remote: &RemoteConfig,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<TrackingRefUpdate>> {
        let dir_name = git_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((dir_name.clone(), credentials.cloned()));
        if let Some(reason) = self.failures.get(&dir_name) {
            return Err(CatalogError::Fetch {
                repository: dir_name.clone(),
                remote: remote.name.clone(),
                reason: reason.value().clone(),
            });
        }
        Ok(self
            .results
            .get(&dir_name)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }
}

type UseCountHook = Box<dyn Fn(&str) + Send + Sync>;

/// [`FsStorage`] wrapper that counts opens, closes and collections and can
/// be told to fail closes.
pub(crate) struct CountingStorage {
    inner: FsStorage,
    opens: AtomicUsize,
    closes: AtomicUsize,
    gc_calls: AtomicUsize,
    fail_close: AtomicBool,
    removed_after_closes: Mutex<Option<usize>>,
    use_count_hook: Mutex<Option<UseCountHook>>,
}

impl CountingStorage {
    pub(crate) fn new(root: &Path) -> Self {
        Self::wrap(FsStorage::new(root))
    }

    pub(crate) fn with_fetcher(root: &Path, fetcher: ScriptedFetcher) -> Self {
        Self::wrap(FsStorage::with_fetcher(root, Box::new(fetcher)))
    }

    fn wrap(inner: FsStorage) -> Self {
        Self {
            inner,
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            gc_calls: AtomicUsize::new(0),
            fail_close: AtomicBool::new(false),
            removed_after_closes: Mutex::new(None),
            use_count_hook: Mutex::new(None),
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn gc_calls(&self) -> usize {
        self.gc_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_closes(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Runs `hook` with the repository name on every use count query.
    pub(crate) fn on_use_count(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self
            .use_count_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Close count observed when the last removal happened.
    pub(crate) fn closes_before_remove(&self) -> Option<usize> {
        *self
            .removed_after_closes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for CountingStorage {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn exists(&self, name: &str) -> bool {
        self.inner.exists(name)
    }

    fn scan(&self, options: &ScanOptions) -> Vec<String> {
        self.inner.scan(options)
    }

    fn open(&self, name: &str) -> Option<StorageHandle> {
        let handle = self.inner.open(name)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Some(handle)
    }

    fn close(&self, handle: &StorageHandle) -> Result<()> {
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(CatalogError::CloseFailed {
                repository: handle.name().to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.close(handle)?;
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle(&self, name: &str) -> Option<StorageHandle> {
        self.inner.handle(name)
    }

    fn use_count(&self, name: &str) -> usize {
        if let Some(hook) = self
            .use_count_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            hook(name);
        }
        self.inner.use_count(name)
    }

    fn is_bare(&self, handle: &StorageHandle) -> bool {
        self.inner.is_bare(handle)
    }

    fn head_ref(&self, handle: &StorageHandle) -> Option<String> {
        self.inner.head_ref(handle)
    }

    fn set_head_ref(&self, handle: &StorageHandle, target: &str) -> Result<()> {
        self.inner.set_head_ref(handle, target)
    }

    fn last_change(&self, handle: &StorageHandle) -> LastChange {
        self.inner.last_change(handle)
    }

    fn has_commits(&self, handle: &StorageHandle) -> bool {
        self.inner.has_commits(handle)
    }

    fn directory_size_bytes(&self, handle: &StorageHandle) -> u64 {
        self.inner.directory_size_bytes(handle)
    }

    fn config(&self, handle: &StorageHandle) -> Result<Box<dyn ConfigStore>> {
        self.inner.config(handle)
    }

    fn read_description(&self, handle: &StorageHandle) -> Option<String> {
        self.inner.read_description(handle)
    }

    fn write_description(&self, handle: &StorageHandle, description: &str) -> Result<()> {
        self.inner.write_description(handle, description)
    }

    fn create(&self, name: &str, shared: bool) -> Result<()> {
        self.inner.create(name, shared)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename(from, to)
    }

    fn remove(&self, name: &str) -> Result<()> {
        *self
            .removed_after_closes
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(self.closes());
        self.inner.remove(name)
    }

    fn fetch(
        &self,
        handle: &StorageHandle,
        remote: &RemoteConfig,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<TrackingRefUpdate>> {
        self.inner.fetch(handle, remote, credentials)
    }

    fn repair_fetch_specs(&self, handle: &StorageHandle) -> Result<bool> {
        self.inner.repair_fetch_specs(handle)
    }

    fn collect_garbage(&self, _handle: &StorageHandle) -> Result<()> {
        self.gc_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn activity_metrics(&self, handle: &StorageHandle, _max_commits: i32) -> Vec<Metric> {
        vec![Metric::new(handle.name())]
    }
}
