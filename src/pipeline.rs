//! Dispatcher and aggregator: fan targets out to probe workers, stream
//! results through a channel into a batching aggregator, and track progress.
//!
//! Per-target flow: Queued -> Probing -> (optional capture request, awaited
//! with a bounded deadline) -> Recorded. Recorded is terminal; output order
//! is completion order, with exactly one record per deduplicated input.

use crate::analyzer::PageCategory;
use crate::capture::{self, ScreenshotEngine};
use crate::probe::{ProbeResult, Prober};
use crate::{Config, ScreenshotMode};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::debug;

/// Results per critical section in the aggregator.
const BATCH_SIZE: usize = 10;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Shared mutable state for one run: counters for the progress reporter and
/// the accumulating result set. Owned by the dispatcher, finalized into an
/// immutable `RunReport`.
#[derive(Default)]
pub struct RunState {
    processed: AtomicUsize,
    alive: AtomicUsize,
    dead: AtomicUsize,
    screenshots: AtomicUsize,
    categories: Mutex<HashMap<PageCategory, usize>>,
    results: Mutex<Vec<ProbeResult>>,
}

impl RunState {
    /// Fold a batch into the accumulator under one critical section.
    async fn absorb(&self, batch: &mut Vec<ProbeResult>, mode: ScreenshotMode) {
        let mut results = self.results.lock().await;
        let mut categories = self.categories.lock().await;

        for result in batch.drain(..) {
            if result.is_alive {
                self.alive.fetch_add(1, Ordering::Relaxed);
                if let Some(category) = result.page_category {
                    *categories.entry(category).or_insert(0) += 1;
                }
            } else {
                self.dead.fetch_add(1, Ordering::Relaxed);
            }

            if result.screenshot.is_some() {
                let counts = match mode {
                    ScreenshotMode::All => true,
                    ScreenshotMode::AliveOnly => result.is_alive,
                    ScreenshotMode::None => false,
                };
                if counts {
                    self.screenshots.fetch_add(1, Ordering::Relaxed);
                }
            }

            results.push(result);
        }
    }
}

/// Finalized, immutable output of a run: the contract with the formatters.
#[derive(Debug)]
pub struct RunReport {
    pub results: Vec<ProbeResult>,
    pub total: usize,
    pub alive: usize,
    pub dead: usize,
    pub categories: HashMap<PageCategory, usize>,
    pub screenshot_count: usize,
    pub elapsed: Duration,
}

/// Drop duplicate targets, keyed by normalized host, preserving first-seen
/// order.
pub fn dedup_targets(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for target in raw {
        let target = target.trim();
        if target.is_empty() {
            continue;
        }
        if seen.insert(normalize_host(target)) {
            targets.push(target.to_string());
        }
    }
    targets
}

/// Dedup key: lowercased host plus any explicit port, scheme ignored.
/// Inputs that defy URL parsing fall back to plain string normalization so
/// they still dedup against themselves.
pub fn normalize_host(target: &str) -> String {
    let lowered = target.trim().to_lowercase();
    let candidate = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        lowered.clone()
    } else {
        format!("http://{lowered}")
    };

    match url::Url::parse(&candidate) {
        Ok(parsed) if parsed.host_str().is_some() => {
            let host = parsed.host_str().unwrap_or_default().to_string();
            match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            }
        }
        _ => lowered
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string(),
    }
}

/// Fans targets into probe workers and collects results through the
/// aggregator.
pub struct Dispatcher {
    config: Config,
    prober: Arc<Prober>,
    engine: Option<Arc<ScreenshotEngine>>,
}

impl Dispatcher {
    pub fn new(config: Config, prober: Prober, engine: Option<Arc<ScreenshotEngine>>) -> Self {
        Self {
            config,
            prober: Arc::new(prober),
            engine,
        }
    }

    /// Probe every target and return the finalized report. Targets must
    /// already be deduplicated.
    pub async fn run(&self, targets: Vec<String>) -> RunReport {
        let total = targets.len();
        let started = Instant::now();
        let state = Arc::new(RunState::default());
        let done = Arc::new(Notify::new());

        let (target_tx, target_rx) = mpsc::channel::<String>(total.max(1));
        let (result_tx, result_rx) = mpsc::channel::<ProbeResult>(total.clamp(1, 1024));
        let target_rx = Arc::new(Mutex::new(target_rx));

        let progress = tokio::spawn(report_progress(state.clone(), total, started, done.clone()));

        let aggregator = tokio::spawn(aggregate(
            result_rx,
            state.clone(),
            self.config.screenshot_mode,
        ));

        let mut workers = Vec::new();
        for id in 0..self.config.concurrency.max(1) {
            workers.push(tokio::spawn(probe_worker(
                id,
                target_rx.clone(),
                result_tx.clone(),
                self.prober.clone(),
                self.engine.clone(),
                self.config.clone(),
            )));
        }
        drop(result_tx);

        for target in targets {
            if target_tx.send(target).await.is_err() {
                break;
            }
        }
        // closing the queue is the exhaustion signal for the workers
        drop(target_tx);

        for worker in workers {
            let _ = worker.await;
        }
        let _ = aggregator.await;

        done.notify_one();
        let _ = progress.await;

        let results = std::mem::take(&mut *state.results.lock().await);
        let categories = std::mem::take(&mut *state.categories.lock().await);

        RunReport {
            results,
            total,
            alive: state.alive.load(Ordering::Relaxed),
            dead: state.dead.load(Ordering::Relaxed),
            categories,
            screenshot_count: state.screenshots.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        }
    }
}

async fn probe_worker(
    id: usize,
    targets: Arc<Mutex<mpsc::Receiver<String>>>,
    results: mpsc::Sender<ProbeResult>,
    prober: Arc<Prober>,
    engine: Option<Arc<ScreenshotEngine>>,
    config: Config,
) {
    debug!(worker = id, "probe worker starting");

    loop {
        let target = { targets.lock().await.recv().await };
        let Some(target) = target else { break };

        let mut result = prober.probe(&target).await;

        if let Some(engine) = engine.as_deref() {
            if config.screenshot_mode.should_capture(result.is_alive) {
                result.screenshot = request_capture(engine, &result.target, &config).await;
            }
        }

        if results.send(result).await.is_err() {
            break;
        }
    }

    debug!(worker = id, "probe worker stopped");
}

/// Submit a capture and wait for the confirmed outcome. The record only ever
/// carries a path to an artifact that exists; an abandoned or failed capture
/// comes back as `None`.
async fn request_capture(
    engine: &ScreenshotEngine,
    target: &str,
    config: &Config,
) -> Option<PathBuf> {
    let dest = config.screenshot_dir.join(capture::artifact_filename(target));
    let reply = engine.submit(target, dest).await;

    match tokio::time::timeout(engine.reply_deadline(), reply).await {
        Ok(Ok(path)) => path,
        Ok(Err(_)) | Err(_) => None,
    }
}

async fn aggregate(
    mut results: mpsc::Receiver<ProbeResult>,
    state: Arc<RunState>,
    mode: ScreenshotMode,
) {
    let mut batch = Vec::with_capacity(BATCH_SIZE);

    while let Some(result) = results.recv().await {
        state.processed.fetch_add(1, Ordering::Relaxed);
        batch.push(result);
        if batch.len() >= BATCH_SIZE {
            state.absorb(&mut batch, mode).await;
        }
    }

    if !batch.is_empty() {
        state.absorb(&mut batch, mode).await;
    }
}

async fn report_progress(
    state: Arc<RunState>,
    total: usize,
    started: Instant,
    done: Arc<Notify>,
) {
    if total == 0 {
        return;
    }

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = state.processed.load(Ordering::Relaxed);
                if current >= total {
                    break;
                }
                let percent = current as f64 / total as f64 * 100.0;
                print!(
                    "\rprogress: {percent:.2}% ({current}/{total}) - {:.1}s",
                    started.elapsed().as_secs_f64()
                );
                let _ = std::io::stdout().flush();
            }
            _ = done.notified() => break,
        }
    }

    // clear the progress line
    print!("\r{:80}\r", "");
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_scheme_case_and_slash() {
        assert_eq!(normalize_host("HTTPS://Example.com/"), "example.com");
        assert_eq!(normalize_host("http://example.com"), "example.com");
        assert_eq!(normalize_host("example.com"), "example.com");
        assert_eq!(normalize_host("  a.example.com:8080  "), "a.example.com:8080");
        assert_eq!(normalize_host("a.com/admin"), "a.com");
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let raw = vec![
            "a.com".to_string(),
            "https://A.com/".to_string(),
            "b.com".to_string(),
            "a.com".to_string(),
            "".to_string(),
        ];
        let deduped = dedup_targets(&raw);
        assert_eq!(deduped, vec!["a.com".to_string(), "b.com".to_string()]);
    }
}
