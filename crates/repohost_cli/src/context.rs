//! Wiring of settings, storage and identity into a catalog.

use anyhow::{anyhow, Context as _, Result};
use repohost_core::{
    CatalogError, FsStorage, GcState, MemoryDirectory, RepositoryCatalog, Settings,
};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Everything a command needs.
pub struct Context {
    pub settings: Arc<RwLock<Settings>>,
    pub catalog: Arc<RepositoryCatalog>,
    pub gc_state: Arc<GcState>,
    pub json: bool,
}

impl Context {
    /// Loads settings and users, then builds the catalog.
    pub fn open(config: &Path, users: &Path, json: bool) -> Result<Self> {
        let settings = Settings::load(config)
            .with_context(|| format!("Failed to load settings from {}", config.display()))?;
        Self::with_settings(settings, users, json)
    }

    pub fn with_settings(settings: Settings, users: &Path, json: bool) -> Result<Self> {
        let directory = MemoryDirectory::load(users)
            .with_context(|| format!("Failed to load users from {}", users.display()))?;
        let storage = FsStorage::new(settings.catalog.repositories_folder.clone());
        let gc_state = Arc::new(GcState::new());
        let settings = Arc::new(RwLock::new(settings));
        let catalog = Arc::new(RepositoryCatalog::new(
            settings.clone(),
            Arc::new(storage),
            Arc::new(directory),
            gc_state.clone(),
        ));
        catalog.confirm_write_access().map_err(explain)?;
        Ok(Self {
            settings,
            catalog,
            gc_state,
            json,
        })
    }

    /// Prints a JSON document on stdout.
    pub fn print_json(&self, value: &Value) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Converts a catalog error, appending its recovery hint.
pub fn explain(err: CatalogError) -> anyhow::Error {
    match err.recovery_suggestion() {
        Some(hint) => anyhow!("{}\n  hint: {}", err, hint),
        None => err.into(),
    }
}
