//! Periodic fetching of mirror repositories.

use crate::catalog::RepositoryCatalog;
use crate::error::Result;
use crate::names::repository_key;
use crate::notify::{NotificationSink, RefUpdateEvent, TICKETS_REF};
use crate::storage::{Credentials, RefUpdateResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Report from one mirror sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    /// Repositories fetched without error.
    pub fetched: usize,
    /// Repositories that are not mirrors, busy or missing.
    pub skipped: usize,
    pub failed: usize,
    pub refs_updated: usize,
    pub notifications: usize,
}

enum Outcome {
    Fetched { refs: usize, notified: bool },
    Skipped,
}

/// Fetches every mirror remote in catalog order.
pub struct MirrorSyncScheduler {
    catalog: Arc<RepositoryCatalog>,
    sink: Arc<dyn NotificationSink>,
    running: AtomicBool,
    cancelled: AtomicBool,
    repair_attempted: Mutex<HashSet<String>>,
}

struct Running<'a>(&'a AtomicBool);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MirrorSyncScheduler {
    pub fn new(catalog: Arc<RepositoryCatalog>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            catalog,
            sink,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            repair_attempted: Mutex::new(HashSet::new()),
        }
    }

    /// True if mirroring is enabled in settings.
    pub fn is_ready(&self) -> bool {
        self.catalog.settings().mirror.enabled
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the current sweep before its next repository.
    pub fn close(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Runs one sweep. Failures are logged per repository and never stop it.
    pub fn run(&self) -> MirrorReport {
        let mut report = MirrorReport::default();
        if !self.is_ready() {
            return report;
        }
        self.running.store(true, Ordering::SeqCst);
        let _running = Running(&self.running);
        let started = Instant::now();

        for name in self.catalog.list() {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("mirror sync cancelled");
                break;
            }
            match self.sync(&name) {
                Ok(Outcome::Fetched { refs, notified }) => {
                    report.fetched += 1;
                    report.refs_updated += refs;
                    report.notifications += usize::from(notified);
                }
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(repository = %name, error = %e, "error updating mirror");
                    report.failed += 1;
                }
            }
        }

        debug!(
            fetched = report.fetched,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mirror sync finished"
        );
        report
    }

    fn sync(&self, name: &str) -> Result<Outcome> {
        if self.catalog.gc_monitor().is_collecting_garbage(name) {
            debug!(repository = %name, "skipping mirror, busy collecting garbage");
            return Ok(Outcome::Skipped);
        }
        let Some(record) = self.catalog.get(name) else {
            return Ok(Outcome::Skipped);
        };
        if !record.is_mirror && !record.is_bare {
            return Ok(Outcome::Skipped);
        }
        let Some(repo) = self.catalog.open(name) else {
            warn!(repository = %name, "failed to open repository for mirror update");
            return Ok(Outcome::Skipped);
        };
        let storage = self.catalog.storage();

        if self.first_attempt(name) {
            if let Err(e) = storage.repair_fetch_specs(&repo) {
                warn!(repository = %name, error = %e, "failed to repair fetch refspecs");
            }
        }

        let Some(remote) = storage
            .config(&repo)?
            .remotes()
            .into_iter()
            .find(|r| r.mirror)
        else {
            return Ok(Outcome::Skipped);
        };

        debug!(repository = %record.name, remote = %remote.name, "checking mirror for updates");
        let credentials = Credentials::from_url(&remote.url);
        let updates = storage.fetch(&repo, &remote, credentials.as_ref())?;

        let mut ticket_event = None;
        for update in &updates {
            info!(
                "updated mirror {} {} -> {}{} {}..{}",
                record.name,
                update.remote_name,
                update.local_name,
                if update.result == RefUpdateResult::Forced {
                    " (forced)"
                } else {
                    ""
                },
                update.old_short(),
                update.new_short()
            );
            if update.local_name == TICKETS_REF {
                if let Some(event) = RefUpdateEvent::from_update(update) {
                    ticket_event = Some(event);
                }
            }
        }

        let notified = ticket_event.is_some();
        if let Some(event) = ticket_event {
            self.sink.publish(&record, &event);
        }
        Ok(Outcome::Fetched {
            refs: updates.len(),
            notified,
        })
    }

    /// Marks the repair attempt for `name`, true the first time only.
    fn first_attempt(&self, name: &str) -> bool {
        self.repair_attempted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(repository_key(name))
    }
}
