//! Run the background services.

use crate::context::Context;
use anyhow::{Context as _, Result};
use console::style;
use repohost_core::{BroadcastSink, GcScheduler, MirrorSyncScheduler, ServiceRunner};
use std::sync::Arc;
use tracing::info;

/// Schedule mirror and GC sweeps until Ctrl-C.
pub fn run(ctx: Context) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        let sink = BroadcastSink::new(64);
        let mut notifications = sink.subscribe();
        tokio::spawn(async move {
            while let Ok(notification) = notifications.recv().await {
                info!(
                    repository = %notification.repository,
                    ref_name = %notification.event.ref_name,
                    command = ?notification.event.command,
                    "ref change"
                );
            }
        });

        let gc = Arc::new(GcScheduler::new(ctx.catalog.clone(), ctx.gc_state.clone()));
        let mirror = Arc::new(MirrorSyncScheduler::new(ctx.catalog.clone(), Arc::new(sink)));
        let mut runner = ServiceRunner::new(ctx.catalog.clone(), gc, mirror);
        runner.start();
        println!(
            "{} Serving {} repositories, press Ctrl-C to stop",
            style("→").cyan(),
            ctx.catalog.list().len()
        );

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        println!("{} Shutting down...", style("→").yellow());
        runner.shutdown().await;
        Ok::<_, anyhow::Error>(())
    })
}
