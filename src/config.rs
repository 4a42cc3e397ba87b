//! Configuration for the prober, the screenshot engine, and the chromium
//! instances the engine launches.

use crate::error::{CaptureError, ProbeError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure.
///
/// Loadable from a JSON file and overridden by CLI flags; every field has a
/// usable default.
///
/// # Examples
///
/// ```rust
/// use subprobe::Config;
///
/// let config = Config {
///     concurrency: 50,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Per-attempt request timeout (default: 10 seconds)
    ///
    /// Applies to each probe attempt independently; the HTTPS attempt and an
    /// HTTP fallback each get the full budget.
    pub timeout: Duration,

    /// Number of concurrent probe workers (default: 10)
    pub concurrency: usize,

    /// Follow redirects to the final response instead of recording the first
    /// redirect response itself (default: false)
    pub follow_redirects: bool,

    /// Extract page title and category from response bodies (default: false)
    pub extract_info: bool,

    /// Screenshot capture mode (default: none)
    pub screenshot_mode: ScreenshotMode,

    /// Directory for captured screenshots (default: `screenshots`)
    pub screenshot_dir: PathBuf,

    /// Cap on how much of a response body is read for page analysis
    /// (default: 512 KiB)
    pub max_body_bytes: usize,

    /// Wait after navigation before capturing, letting client-side rendering
    /// finish (default: 2 seconds)
    pub settle_delay: Duration,

    /// JPEG quality for captured screenshots, 1-100 (default: 80)
    pub capture_quality: i64,

    /// Capture attempts per screenshot task before it is recorded as a hard
    /// failure (default: 3)
    pub retry_attempts: usize,

    /// Render queue capacity as a multiple of the worker count (default: 2)
    pub queue_multiplier: usize,

    /// Browser viewport for captures
    pub viewport: Viewport,

    /// Path to a Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent for probe requests (default: library default)
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            concurrency: 10,
            follow_redirects: false,
            extract_info: false,
            screenshot_mode: ScreenshotMode::None,
            screenshot_dir: PathBuf::from("screenshots"),
            max_body_bytes: 512 * 1024,
            settle_delay: Duration::from_secs(2),
            capture_quality: 80,
            retry_attempts: 3,
            queue_multiplier: 2,
            viewport: Viewport::default(),
            chrome_path: None,
            user_agent: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.concurrency == 0 {
            return Err(ProbeError::Configuration(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ProbeError::Configuration(
                "timeout must be greater than 0".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(ProbeError::Configuration(
                "retry attempts must be greater than 0".to_string(),
            ));
        }
        if !(1..=100).contains(&self.capture_quality) {
            return Err(ProbeError::Configuration(
                "capture quality must be between 1 and 100".to_string(),
            ));
        }
        if self.queue_multiplier == 0 {
            return Err(ProbeError::Configuration(
                "queue multiplier must be greater than 0".to_string(),
            ));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ProbeError::Configuration(
                "viewport dimensions must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which probe outcomes get a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenshotMode {
    /// No captures
    None,
    /// Capture every target, error pages included
    All,
    /// Capture only targets that probed alive
    AliveOnly,
}

impl ScreenshotMode {
    pub fn enabled(&self) -> bool {
        !matches!(self, ScreenshotMode::None)
    }

    /// Gate for a single probe outcome.
    pub fn should_capture(&self, is_alive: bool) -> bool {
        match self {
            ScreenshotMode::None => false,
            ScreenshotMode::All => true,
            ScreenshotMode::AliveOnly => is_alive,
        }
    }
}

/// Browser viewport used for captures.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Marker embedded in every chromium user-data directory this process
/// creates. The lifecycle controller matches on it when sweeping stray
/// renderer processes.
pub fn user_data_marker() -> String {
    format!("chromium-subprobe-{}", std::process::id())
}

/// Chromium command-line arguments for one isolated instance.
///
/// Each instance gets a unique user-data directory and debugging port so
/// concurrent launches never trip over Chrome's process singleton.
pub fn get_chrome_args(config: &Config, instance_id: usize) -> Vec<String> {
    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-client-side-phishing-detection".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-extensions".to_string(),
        "--disable-hang-monitor".to_string(),
        "--disable-popup-blocking".to_string(),
        "--disable-prompt-on-repost".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--memory-pressure-off".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--allow-running-insecure-content".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!(
            "--user-data-dir=/tmp/{}-{}",
            user_data_marker(),
            instance_id
        ),
        format!("--remote-debugging-port={}", 9222 + instance_id),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

/// Browser configuration for one isolated instance.
pub fn create_browser_config(
    config: &Config,
    instance_id: usize,
) -> Result<chromiumoxide::browser::BrowserConfig, CaptureError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config, instance_id));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(CaptureError::BrowserLaunchFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.screenshot_mode, ScreenshotMode::None);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let config = Config {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            capture_quality: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            capture_quality: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn screenshot_mode_gating() {
        assert!(!ScreenshotMode::None.should_capture(true));
        assert!(!ScreenshotMode::None.should_capture(false));
        assert!(ScreenshotMode::All.should_capture(true));
        assert!(ScreenshotMode::All.should_capture(false));
        assert!(ScreenshotMode::AliveOnly.should_capture(true));
        assert!(!ScreenshotMode::AliveOnly.should_capture(false));
    }

    #[test]
    fn chrome_args_isolate_instances() {
        let config = Config::default();
        let args_a = get_chrome_args(&config, 0);
        let args_b = get_chrome_args(&config, 1);

        assert!(args_a.contains(&"--headless".to_string()));
        assert!(args_a.contains(&"--no-sandbox".to_string()));

        let data_dir = |args: &[String]| {
            args.iter()
                .find(|a| a.starts_with("--user-data-dir="))
                .cloned()
                .unwrap()
        };
        assert_ne!(data_dir(&args_a), data_dir(&args_b));
        assert!(data_dir(&args_a).contains(&user_data_marker()));
    }
}
