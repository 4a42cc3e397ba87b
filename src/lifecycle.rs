//! Run lifecycle: resource-aware screenshot pool sizing, signal handling,
//! a top-level panic guard, and cleanup of stray renderer processes.
//!
//! Shutdown always runs in the same order, whether the run completed, was
//! interrupted, or panicked: stop the engine (draining in-flight renders),
//! then sweep any chromium process still carrying this run's user-data
//! marker.

use crate::capture::ScreenshotEngine;
use crate::config;
use crate::error::ProbeError;
use crate::pipeline::{Dispatcher, RunReport};
use crate::probe::Prober;
use crate::resources::SystemResources;
use crate::Config;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use sysinfo::{ProcessRefreshKind, RefreshKind, System};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub struct LifecycleController {
    config: Config,
    resources: SystemResources,
}

impl LifecycleController {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            resources: SystemResources::detect(),
        }
    }

    /// Test seam: inject fixed resource numbers instead of probing the host.
    pub fn with_resources(config: Config, resources: SystemResources) -> Self {
        Self { config, resources }
    }

    /// Run the full pipeline over an already-deduplicated target list.
    pub async fn run(&self, targets: Vec<String>) -> Result<RunReport, ProbeError> {
        let engine = self.build_engine(targets.len()).await?;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let signal_task = spawn_signal_listener(shutdown_tx);

        let prober =
            Prober::new(&self.config).map_err(|e| ProbeError::Configuration(e.to_string()))?;
        let dispatcher = Dispatcher::new(self.config.clone(), prober, engine.clone());

        let pipeline = AssertUnwindSafe(dispatcher.run(targets)).catch_unwind();
        tokio::pin!(pipeline);

        let outcome = tokio::select! {
            outcome = &mut pipeline => outcome,
            _ = shutdown_rx.recv() => {
                warn!("interrupt received, draining renderers before exit");
                self.shutdown(engine.as_deref()).await;
                signal_task.abort();
                return Err(ProbeError::Interrupted);
            }
        };
        signal_task.abort();

        match outcome {
            Ok(report) => {
                self.shutdown(engine.as_deref()).await;
                Ok(report)
            }
            Err(panic) => {
                error!("pipeline panicked, cleaning up renderers before re-raising");
                self.shutdown(engine.as_deref()).await;
                std::panic::resume_unwind(panic);
            }
        }
    }

    async fn build_engine(
        &self,
        target_count: usize,
    ) -> Result<Option<Arc<ScreenshotEngine>>, ProbeError> {
        if !self.config.screenshot_mode.enabled() {
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.config.screenshot_dir)
            .await
            .map_err(|e| {
                ProbeError::Configuration(format!(
                    "cannot create screenshot directory {}: {e}",
                    self.config.screenshot_dir.display()
                ))
            })?;

        let workers = self
            .resources
            .screenshot_worker_count(self.config.concurrency, target_count);
        info!(
            workers,
            cpus = self.resources.cpu_count,
            memory = self.resources.total_memory,
            targets = target_count,
            "sizing screenshot pool"
        );

        let engine = Arc::new(ScreenshotEngine::new(self.config.clone(), workers));
        engine.start().await;
        Ok(Some(engine))
    }

    async fn shutdown(&self, engine: Option<&ScreenshotEngine>) {
        if let Some(engine) = engine {
            engine.stop().await;
        }
        cleanup_stray_browsers();
    }
}

fn spawn_signal_listener(shutdown_tx: broadcast::Sender<()>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(err) => {
                    error!(error = %err, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = signal::ctrl_c() => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = signal::ctrl_c().await;
            info!("received interrupt");
        }

        let _ = shutdown_tx.send(());
    })
}

/// Kill any chromium process still carrying this run's user-data marker.
/// The engine shuts its browsers down itself; this is the backstop for
/// instances orphaned by a crash mid-launch.
pub fn cleanup_stray_browsers() {
    let marker = config::user_data_marker();
    let sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::new().with_cmd(
            sysinfo::UpdateKind::Always,
        )),
    );

    let mut killed = 0usize;
    for process in sys.processes().values() {
        let matches = process.cmd().iter().any(|arg| arg.contains(&marker));
        if matches && process.kill() {
            killed += 1;
        }
    }

    if killed > 0 {
        warn!(killed, "terminated stray renderer processes");
    }
}
