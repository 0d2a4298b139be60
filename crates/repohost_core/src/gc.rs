//! Scheduled garbage collection of hosted repositories.
//!
//! While a repository is being collected it is excluded from every other
//! component: the catalog hands out flagged cached copies without touching
//! storage, refuses mutations, and the mirror sweep skips it. That contract
//! is exposed through [`GcMonitor`].

use crate::byte_format::{format_bytes, parse_size};
use crate::catalog::RepositoryCatalog;
use crate::error::Result;
use crate::names::repository_key;
use crate::record::RepositoryRecord;
use crate::storage::OpenRepository;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Garbage collector status as seen by other components.
pub trait GcMonitor: Send + Sync {
    /// True while a sweep is in progress.
    fn is_running(&self) -> bool;
    /// True while `name` is being collected.
    fn is_collecting_garbage(&self, name: &str) -> bool;
}

/// Shared collection state.
#[derive(Debug, Default)]
pub struct GcState {
    running: AtomicBool,
    collecting: DashSet<String>,
}

impl GcState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` as being collected until the guard is dropped.
    pub fn begin(&self, name: &str) -> CollectingGuard<'_> {
        let key = repository_key(name);
        self.collecting.insert(key.clone());
        CollectingGuard { state: self, key }
    }

    fn start(&self) -> RunningGuard<'_> {
        self.running.store(true, Ordering::SeqCst);
        RunningGuard { state: self }
    }
}

impl GcMonitor for GcState {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_collecting_garbage(&self, name: &str) -> bool {
        self.collecting.contains(&repository_key(name))
    }
}

/// Clears a repository's collecting mark on drop.
pub struct CollectingGuard<'a> {
    state: &'a GcState,
    key: String,
}

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        self.state.collecting.remove(&self.key);
    }
}

struct RunningGuard<'a> {
    state: &'a GcState,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::SeqCst);
    }
}

/// Report from one collection sweep.
#[derive(Debug, Default)]
pub struct GcReport {
    /// Repositories looked at.
    pub examined: usize,

    /// Repositories compacted.
    pub collected: usize,

    /// Repositories not due, too small or in use.
    pub skipped: usize,

    /// Errors encountered during the sweep (non-fatal).
    pub errors: Vec<String>,
}

/// Periodically compacts repositories that are due and large enough.
pub struct GcScheduler {
    catalog: Arc<RepositoryCatalog>,
    state: Arc<GcState>,
    cancelled: AtomicBool,
}

impl GcScheduler {
    pub fn new(catalog: Arc<RepositoryCatalog>, state: Arc<GcState>) -> Self {
        Self {
            catalog,
            state,
            cancelled: AtomicBool::new(false),
        }
    }

    /// True if collection is enabled in settings.
    pub fn is_ready(&self) -> bool {
        self.catalog.settings().gc.enabled
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Stops the current sweep before its next repository.
    pub fn close(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Runs one sweep over the catalog.
    pub fn run(&self) -> GcReport {
        let mut report = GcReport::default();
        if !self.is_ready() {
            return report;
        }
        let _running = self.state.start();
        let started = Instant::now();
        let now = Utc::now();

        for name in self.catalog.list() {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("garbage collection cancelled");
                break;
            }
            let Some(record) = self.catalog.get(&name) else {
                continue;
            };
            report.examined += 1;
            match self.collect(&record, now) {
                Ok(true) => report.collected += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    error!(repository = %name, error = %e, "garbage collection failed");
                    report.errors.push(format!("{}: {}", name, e));
                }
            }
        }

        info!(
            examined = report.examined,
            collected = report.collected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "garbage collection finished"
        );
        report
    }

    fn collect(&self, record: &RepositoryRecord, now: DateTime<Utc>) -> Result<bool> {
        if !is_due(record, now) {
            debug!(repository = %record.name, "gc not due");
            return Ok(false);
        }
        let storage = self.catalog.storage().as_ref();
        // Mark first so no new handle can be opened between check and collect.
        let _collecting = self.state.begin(&record.name);
        if storage.use_count(&record.name) > 0 {
            debug!(repository = %record.name, "gc skipping repository in use");
            return Ok(false);
        }
        let Some(repo) = OpenRepository::open(storage, &record.name) else {
            warn!(repository = %record.name, "gc is missing repository");
            return Ok(false);
        };
        let size = storage.directory_size_bytes(&repo);
        let threshold = parse_size(&record.gc_threshold).unwrap_or_else(|| {
            warn!(repository = %record.name, threshold = %record.gc_threshold, "invalid gc threshold");
            0
        });
        if size < threshold {
            debug!(repository = %record.name, size = %format_bytes(size), "gc below threshold");
            return Ok(false);
        }

        info!(repository = %record.name, size = %format_bytes(size), "collecting garbage");
        storage.collect_garbage(&repo)?;
        drop(repo);
        self.catalog.record_garbage_collected(&record.name, now)?;
        Ok(true)
    }
}

/// True once `gc_period` days have passed since the last collection.
fn is_due(record: &RepositoryRecord, now: DateTime<Utc>) -> bool {
    record.last_gc + Duration::days(record.gc_period.max(0)) <= now
}
