//! Background scheduling of the mirror and garbage collection sweeps.
//!
//! Each service runs on a fixed-rate tokio interval. A tick hands the sweep to
//! the blocking pool and awaits it, so a sweep never overlaps itself; ticks
//! missed while it ran are skipped. Aborting a service task does not stop a
//! sweep already on the blocking pool, so shutdown waits for in-flight sweeps
//! before closing repositories.

use crate::catalog::RepositoryCatalog;
use crate::gc::GcScheduler;
use crate::mirror::MirrorSyncScheduler;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

const GC_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);
const MIRROR_FIRST_DELAY: Duration = Duration::from_secs(60);

/// Time from `now` until the next `hour`:00, today or tomorrow.
pub fn delay_until_hour(now: NaiveDateTime, hour: u32) -> Duration {
    let Some(today) = now.date().and_hms_opt(hour.min(23), 0, 0) else {
        return Duration::ZERO;
    };
    let next = if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Spawns `sweep` every `period`, starting after `first`. Each run holds a
/// read lock on `sweeps` for its whole duration.
fn spawn_periodic<F>(
    service: &'static str,
    first: Duration,
    period: Duration,
    sweeps: Arc<RwLock<()>>,
    sweep: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    let sweep = Arc::new(sweep);
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + first, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let sweep = sweep.clone();
            let sweeps = sweeps.clone();
            let run = move || {
                let _sweeping = sweeps.read().unwrap_or_else(PoisonError::into_inner);
                sweep()
            };
            if let Err(e) = tokio::task::spawn_blocking(run).await {
                error!(service, error = %e, "sweep panicked");
            }
        }
    })
}

/// Runs `f` once no sweep is in flight, keeping new sweeps out until it
/// returns.
fn with_sweeps_idle<T>(sweeps: &RwLock<()>, f: impl FnOnce() -> T) -> T {
    let _idle = sweeps.write().unwrap_or_else(PoisonError::into_inner);
    f()
}

/// Owns the background services of a running server.
pub struct ServiceRunner {
    catalog: Arc<RepositoryCatalog>,
    gc: Arc<GcScheduler>,
    mirror: Arc<MirrorSyncScheduler>,
    sweeps: Arc<RwLock<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceRunner {
    pub fn new(
        catalog: Arc<RepositoryCatalog>,
        gc: Arc<GcScheduler>,
        mirror: Arc<MirrorSyncScheduler>,
    ) -> Self {
        Self {
            catalog,
            gc,
            mirror,
            sweeps: Arc::new(RwLock::new(())),
            tasks: Vec::new(),
        }
    }

    /// Schedules every enabled service. Must be called inside a tokio runtime.
    pub fn start(&mut self) {
        let settings = self.catalog.settings();

        if self.gc.is_ready() {
            let first = delay_until_hour(Local::now().naive_local(), settings.gc.hour);
            info!(first_run_in_mins = first.as_secs() / 60, "garbage collector scheduled");
            let gc = self.gc.clone();
            let sweeps = self.sweeps.clone();
            self.tasks.push(spawn_periodic("gc", first, GC_PERIOD, sweeps, move || {
                gc.run();
            }));
        } else {
            info!("garbage collector disabled");
        }

        if self.mirror.is_ready() {
            let period = settings.mirror.period();
            info!(period_mins = period.as_secs() / 60, "mirror executor scheduled");
            let mirror = self.mirror.clone();
            let sweeps = self.sweeps.clone();
            self.tasks.push(spawn_periodic("mirror", MIRROR_FIRST_DELAY, period, sweeps, move || {
                mirror.run();
            }));
        } else {
            info!("mirror executor disabled");
        }
    }

    /// Number of scheduled services.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancels the sweeps, stops scheduling and closes every repository once
    /// the last running sweep has returned.
    pub async fn shutdown(mut self) {
        self.gc.close();
        self.mirror.close();
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        let catalog = self.catalog.clone();
        let sweeps = self.sweeps.clone();
        let close = move || with_sweeps_idle(&sweeps, || catalog.close_all_repositories());
        if let Err(e) = tokio::task::spawn_blocking(close).await {
            error!(error = %e, "failed to close repositories");
        }
        info!("services stopped");
    }
}
