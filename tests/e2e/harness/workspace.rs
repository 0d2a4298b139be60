use super::doubles::ReplayFetcher;
use anyhow::{Context, Result};
use repohost_core::{FsStorage, GcState, MemoryDirectory, RepositoryCatalog, Settings};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tempfile::TempDir;

/// An isolated server: a temporary repositories folder plus the state that
/// survives a restart (settings, users and the garbage collector's flags).
pub struct TestWorkspace {
    dir: TempDir,
    settings: Arc<RwLock<Settings>>,
    directory: Arc<MemoryDirectory>,
    gc: Arc<GcState>,
    fetcher: ReplayFetcher,
}

impl TestWorkspace {
    /// Create an empty workspace with mirroring enabled
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp directory")?;
        let mut settings = Settings::default();
        settings.catalog.repositories_folder = dir.path().to_path_buf();
        settings.mirror.enabled = true;
        Ok(Self {
            dir,
            settings: Arc::new(RwLock::new(settings)),
            directory: Arc::new(MemoryDirectory::new()),
            gc: Arc::new(GcState::new()),
            fetcher: ReplayFetcher::default(),
        })
    }

    /// Repositories folder
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn settings(&self) -> &Arc<RwLock<Settings>> {
        &self.settings
    }

    pub fn directory(&self) -> &Arc<MemoryDirectory> {
        &self.directory
    }

    pub fn gc(&self) -> &Arc<GcState> {
        &self.gc
    }

    pub fn fetcher(&self) -> &ReplayFetcher {
        &self.fetcher
    }

    /// Build a fresh catalog over the workspace, with cold caches
    pub fn open_catalog(&self) -> Result<Arc<RepositoryCatalog>> {
        let storage = FsStorage::with_fetcher(self.path(), Box::new(self.fetcher.clone()));
        let catalog = RepositoryCatalog::new(
            self.settings.clone(),
            Arc::new(storage),
            self.directory.clone(),
            self.gc.clone(),
        );
        catalog.confirm_write_access()?;
        Ok(Arc::new(catalog))
    }

    /// Write file to workspace
    pub fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.path().join(path);

        // Create parent directories
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {}", path))?;
        }

        fs::write(&full_path, content)
            .with_context(|| format!("Failed to write file: {}", path))?;

        Ok(())
    }

    /// Check if file exists
    pub fn file_exists(&self, path: &str) -> bool {
        self.path().join(path).exists()
    }
}
