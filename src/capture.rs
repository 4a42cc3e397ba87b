//! Screenshot engine: a pool of rendering workers, each owning one isolated
//! headless chromium instance for its whole lifetime.
//!
//! Isolation is the point: one hung page never stalls another worker's
//! browser. Submissions go through a bounded queue with a short enqueue wait
//! so a saturated pool can never back-pressure the probing pipeline into a
//! deadlock: when the queue stays full past the wait, the submission is
//! abandoned and its reply resolves empty.

use crate::config;
use crate::error::{network_error_label, CaptureError};
use crate::resources;
use crate::Config;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// How long a submission may wait for queue space before it is abandoned.
const SUBMIT_WAIT: Duration = Duration::from_secs(1);

/// Linear backoff step between capture attempts.
const RETRY_STEP: Duration = Duration::from_millis(500);

/// One render request. The reply side is owned by the engine until it writes
/// exactly one value: the artifact path, or `None` on a hard failure.
struct CaptureTask {
    url: String,
    dest: PathBuf,
    reply: oneshot::Sender<Option<PathBuf>>,
}

#[derive(Default)]
struct EngineStats {
    total: AtomicU64,
    /// Tasks that produced an artifact, placeholders included
    artifacts: AtomicU64,
    soft_failures: AtomicU64,
    hard_failures: AtomicU64,
}

/// Pool of rendering workers fed through a bounded task queue.
pub struct ScreenshotEngine {
    config: Config,
    workers: usize,
    task_timeout: Duration,
    sender: Mutex<Option<mpsc::Sender<CaptureTask>>>,
    receiver: Arc<Mutex<mpsc::Receiver<CaptureTask>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
    stats: Arc<EngineStats>,
}

impl ScreenshotEngine {
    pub fn new(config: Config, workers: usize) -> Self {
        let workers = workers.max(1);
        let capacity = workers * config.queue_multiplier.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        Self {
            task_timeout: resources::capture_timeout(workers),
            config,
            workers,
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
            handles: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Upper bound on how long a submitted task can take end to end: the
    /// enqueue wait, every attempt with its timeout, the backoff pauses, and
    /// headroom for the placeholder render. Callers awaiting a reply use
    /// this as their deadline.
    pub fn reply_deadline(&self) -> Duration {
        let attempts = self.config.retry_attempts.max(1) as u32;
        SUBMIT_WAIT + self.task_timeout * (attempts + 1) + RETRY_STEP * attempts + Duration::from_secs(5)
    }

    /// Spawn the rendering workers. Call once, before any submissions.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for id in 0..self.workers {
            let receiver = self.receiver.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();
            let task_timeout = self.task_timeout;
            handles.push(tokio::spawn(async move {
                run_worker(id, receiver, stats, config, task_timeout).await;
            }));
        }
        info!(workers = self.workers, timeout = ?self.task_timeout, "screenshot engine started");
    }

    /// Enqueue a render. The returned receiver resolves to the artifact path,
    /// or to `None` when the task hard-fails, the queue stays full past the
    /// bounded wait, or the engine has stopped. Never blocks the caller
    /// longer than the enqueue wait.
    pub async fn submit(&self, url: &str, dest: PathBuf) -> oneshot::Receiver<Option<PathBuf>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        if self.stopped.load(Ordering::SeqCst) {
            let _ = reply_tx.send(None);
            return reply_rx;
        }

        let sender = self.sender.lock().await.clone();
        let Some(sender) = sender else {
            let _ = reply_tx.send(None);
            return reply_rx;
        };

        let task = CaptureTask {
            url: url.to_string(),
            dest,
            reply: reply_tx,
        };

        match sender.send_timeout(task, SUBMIT_WAIT).await {
            Ok(()) => {}
            Err(mpsc::error::SendTimeoutError::Timeout(task)) => {
                warn!(url = %task.url, "render queue saturated, abandoning submission");
                let _ = task.reply.send(None);
            }
            Err(mpsc::error::SendTimeoutError::Closed(task)) => {
                let _ = task.reply.send(None);
            }
        }

        reply_rx
    }

    /// Close the queue and wait for in-flight renders to finish. Safe to call
    /// again: later calls find nothing left to join and return immediately.
    pub async fn stop(&self) {
        let first = !self.stopped.swap(true, Ordering::SeqCst);
        self.sender.lock().await.take();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            let _ = handle.await;
        }

        if first {
            self.log_summary();
        }
    }

    fn log_summary(&self) {
        let total = self.stats.total.load(Ordering::Relaxed);
        if total == 0 {
            info!("screenshot engine stopped, no tasks processed");
            return;
        }
        let artifacts = self.stats.artifacts.load(Ordering::Relaxed);
        let soft = self.stats.soft_failures.load(Ordering::Relaxed);
        let hard = self.stats.hard_failures.load(Ordering::Relaxed);
        info!(
            total,
            artifacts,
            soft_failures = soft,
            hard_failures = hard,
            success_rate = format!("{:.1}%", artifacts as f64 / total as f64 * 100.0),
            "screenshot engine stopped"
        );
    }
}

/// Outcome of one capture task after retries.
enum CaptureOutcome {
    /// Real page capture written to the destination
    Captured(PathBuf),
    /// Network-level failure, placeholder artifact written instead
    Placeholder(PathBuf),
    /// No artifact
    Failed,
}

/// Outcome of a single attempt, driving the retry loop.
enum Attempt {
    Success,
    /// Recognized network error; no point retrying, the target is down
    SoftFail(String),
    Retry(String),
}

async fn run_worker(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<CaptureTask>>>,
    stats: Arc<EngineStats>,
    config: Config,
    task_timeout: Duration,
) {
    info!(worker = id, "screenshot worker starting");

    let (mut browser, handler) = match launch_browser(&config, id).await {
        Ok(pair) => pair,
        Err(err) => {
            error!(worker = id, error = %err, "browser launch failed, worker exiting");
            return;
        }
    };

    loop {
        let task = { receiver.lock().await.recv().await };
        let Some(task) = task else { break };

        stats.total.fetch_add(1, Ordering::Relaxed);
        let outcome =
            capture_with_retry(&browser, &task.url, &task.dest, &config, task_timeout, id).await;

        match outcome {
            CaptureOutcome::Captured(path) => {
                stats.artifacts.fetch_add(1, Ordering::Relaxed);
                debug!(worker = id, url = %task.url, "capture succeeded");
                let _ = task.reply.send(Some(path));
            }
            CaptureOutcome::Placeholder(path) => {
                stats.artifacts.fetch_add(1, Ordering::Relaxed);
                stats.soft_failures.fetch_add(1, Ordering::Relaxed);
                let _ = task.reply.send(Some(path));
            }
            CaptureOutcome::Failed => {
                stats.hard_failures.fetch_add(1, Ordering::Relaxed);
                warn!(worker = id, url = %task.url, "capture failed, no artifact");
                let _ = task.reply.send(None);
            }
        }
    }

    if let Err(err) = browser.close().await {
        debug!(worker = id, error = %err, "browser close reported an error");
    }
    handler.abort();
    info!(worker = id, "screenshot worker stopped");
}

async fn launch_browser(
    config: &Config,
    instance_id: usize,
) -> Result<(Browser, JoinHandle<()>), CaptureError> {
    let browser_config = config::create_browser_config(config, instance_id)?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| CaptureError::BrowserLaunchFailed(e.to_string()))?;

    // The handler is a stream of CDP events and must be polled for the
    // browser connection to make progress.
    let handler_task = tokio::spawn(async move {
        loop {
            match handler.next().await {
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(error = %err, "cdp handler error, stopping event loop");
                    break;
                }
                None => break,
            }
        }
    });

    Ok((browser, handler_task))
}

/// Attempt state machine: Success ends the task, a recognized network error
/// short-circuits into a placeholder artifact, anything else retries with
/// linearly increasing backoff until the attempt budget runs out.
async fn capture_with_retry(
    browser: &Browser,
    url: &str,
    dest: &Path,
    config: &Config,
    task_timeout: Duration,
    worker: usize,
) -> CaptureOutcome {
    let target = ensure_scheme(url);
    let attempts = config.retry_attempts.max(1);

    for attempt in 0..attempts {
        if attempt > 0 {
            let backoff = RETRY_STEP * attempt as u32;
            debug!(worker, url = %target, attempt, backoff = ?backoff, "retrying capture");
            sleep(backoff).await;
        }

        match run_attempt(browser, &target, dest, config, task_timeout).await {
            Attempt::Success => return CaptureOutcome::Captured(dest.to_path_buf()),
            Attempt::SoftFail(err) => {
                warn!(worker, url = %target, error = %err, "network-level render failure, writing placeholder");
                return write_placeholder(browser, dest, &target, &err, config, task_timeout).await;
            }
            Attempt::Retry(err) => {
                warn!(worker, url = %target, attempt, error = %err, "capture attempt failed");
            }
        }
    }

    CaptureOutcome::Failed
}

async fn run_attempt(
    browser: &Browser,
    url: &str,
    dest: &Path,
    config: &Config,
    task_timeout: Duration,
) -> Attempt {
    match timeout(task_timeout, capture_once(browser, url, dest, config)).await {
        Ok(Ok(())) => Attempt::Success,
        Ok(Err(err)) => {
            if err.is_network_class() {
                Attempt::SoftFail(err.to_string())
            } else {
                Attempt::Retry(err.to_string())
            }
        }
        Err(_) => Attempt::Retry(CaptureError::Timeout(task_timeout).to_string()),
    }
}

async fn capture_once(
    browser: &Browser,
    url: &str,
    dest: &Path,
    config: &Config,
) -> Result<(), CaptureError> {
    let page = browser
        .new_page(url)
        .await
        .map_err(|e| CaptureError::NavigationFailed(e.to_string()))?;

    sleep(config.settle_delay).await;

    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Jpeg)
        .quality(config.capture_quality)
        .full_page(true)
        .build();

    let shot = page.screenshot(params).await;
    let _ = page.close().await;

    let data = shot.map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
    tokio::fs::write(dest, &data).await?;
    Ok(())
}

/// Render an error card for a soft failure. The worker's own browser draws
/// it, so the card looks like any other capture; a flat image is the last
/// resort when even that render fails.
async fn write_placeholder(
    browser: &Browser,
    dest: &Path,
    target: &str,
    err: &str,
    config: &Config,
    task_timeout: Duration,
) -> CaptureOutcome {
    let card = render_error_card(browser, dest, target, err, config);
    match timeout(task_timeout, card).await {
        Ok(Ok(())) => CaptureOutcome::Placeholder(dest.to_path_buf()),
        Ok(Err(render_err)) => {
            debug!(url = %target, error = %render_err, "error card render failed, writing flat placeholder");
            flat_placeholder(dest)
        }
        Err(_) => flat_placeholder(dest),
    }
}

async fn render_error_card(
    browser: &Browser,
    dest: &Path,
    target: &str,
    err: &str,
    config: &Config,
) -> Result<(), CaptureError> {
    let label = network_error_label(err);
    let html = format!(
        "<html><body style=\"background:#f0f0f0;font-family:sans-serif;\
         display:flex;align-items:center;justify-content:center;height:100vh;margin:0\">\
         <div style=\"text-align:center;color:#444\">\
         <h1 style=\"color:#e8640c\">Capture unavailable</h1>\
         <p>{target}</p><p>{label}</p></div></body></html>",
        target = escape_html(target),
        label = label,
    );

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| CaptureError::NavigationFailed(e.to_string()))?;

    let content = page.set_content(html).await;
    let shot = match content {
        Ok(_) => {
            page.screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Jpeg)
                    .quality(config.capture_quality)
                    .build(),
            )
            .await
        }
        Err(e) => Err(e),
    };
    let _ = page.close().await;

    let data = shot.map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
    tokio::fs::write(dest, &data).await?;
    Ok(())
}

fn flat_placeholder(dest: &Path) -> CaptureOutcome {
    let img = image::RgbImage::from_pixel(800, 600, image::Rgb([240, 240, 240]));
    match img.save(dest) {
        Ok(()) => CaptureOutcome::Placeholder(dest.to_path_buf()),
        Err(err) => {
            error!(dest = %dest.display(), error = %err, "placeholder write failed");
            CaptureOutcome::Failed
        }
    }
}

fn ensure_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Unique artifact file name for a target.
pub fn artifact_filename(target: &str) -> String {
    let stripped = target
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    let sanitized: String = stripped
        .chars()
        .map(|c| match c {
            '/' | ':' | '?' | '&' | '=' | '*' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    format!("{}_{}.jpg", sanitized, uuid::Uuid::new_v4().simple())
}
