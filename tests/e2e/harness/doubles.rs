use anyhow::Result as AnyResult;
use repohost_core::{
    Credentials, Fetcher, NotificationSink, RefUpdateEvent, RemoteConfig, RepositoryRecord,
    Result, TrackingRefUpdate,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Fetcher replaying scripted updates, keyed by the repository's folder name.
#[derive(Clone, Default)]
pub struct ReplayFetcher {
    scripts: Arc<Mutex<HashMap<String, Vec<TrackingRefUpdate>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ReplayFetcher {
    pub fn script(&self, dir_name: &str, updates: Vec<TrackingRefUpdate>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dir_name.to_string(), updates);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Fetcher for ReplayFetcher {
    fn fetch(
        &self,
        git_dir: &Path,
        _remote: &RemoteConfig,
        _credentials: Option<&Credentials>,
    ) -> Result<Vec<TrackingRefUpdate>> {
        let dir_name = git_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dir_name.clone());
        // Updates are delivered once, like a real fetch.
        Ok(self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&dir_name)
            .unwrap_or_default())
    }
}

/// Sink remembering which repositories were notified.
#[derive(Clone, Default)]
pub struct RecordingSink {
    published: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn check_empty(&self) -> AnyResult<()> {
        let published = self.published();
        anyhow::ensure!(published.is_empty(), "unexpected notifications: {:?}", published);
        Ok(())
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, record: &RepositoryRecord, _event: &RefUpdateEvent) {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.name.clone());
    }
}
