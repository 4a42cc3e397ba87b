use std::time::Duration;
use thiserror::Error;

/// Errors that abort a run before or while the pipeline is being set up.
///
/// Transport-level failures never appear here: the prober folds them into a
/// `ProbeResult` with an `Unreachable` classification instead.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no targets to probe")]
    NoTargets,

    #[error("failed to read target list {path}: {source}")]
    TargetSource {
        path: String,
        source: std::io::Error,
    },

    #[error("screenshot capture requires --excel or --html output")]
    MissingScreenshotOutput,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("interrupted by signal")]
    Interrupted,
}

/// Errors raised inside the screenshot engine.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("screenshot capture failed: {0}")]
    CaptureFailed(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(String),
}

/// Chromium network error markers that classify a render failure as a soft
/// failure: the page itself was unreachable, the browser is fine, and a
/// placeholder artifact stands in for the capture.
const NETWORK_ERROR_MARKERS: &[&str] = &[
    "net::ERR_INVALID_RESPONSE",
    "net::ERR_CONNECTION_REFUSED",
    "net::ERR_NAME_NOT_RESOLVED",
    "net::ERR_TIMED_OUT",
];

impl CaptureError {
    /// True when the failure is a recognized network-level error rather than a
    /// browser or capture problem.
    pub fn is_network_class(&self) -> bool {
        let text = self.to_string();
        NETWORK_ERROR_MARKERS
            .iter()
            .any(|marker| text.contains(marker))
    }
}

/// Human-readable label for a recognized network error, used on placeholder
/// artifacts.
pub fn network_error_label(message: &str) -> &'static str {
    if message.contains("ERR_INVALID_RESPONSE") {
        "invalid response (ERR_INVALID_RESPONSE)"
    } else if message.contains("ERR_NAME_NOT_RESOLVED") {
        "name not resolved (ERR_NAME_NOT_RESOLVED)"
    } else if message.contains("ERR_CONNECTION_REFUSED") {
        "connection refused (ERR_CONNECTION_REFUSED)"
    } else if message.contains("ERR_TIMED_OUT") {
        "connection timed out (ERR_TIMED_OUT)"
    } else {
        "network error"
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_class_errors_are_recognized() {
        let err = CaptureError::NavigationFailed("net::ERR_CONNECTION_REFUSED".to_string());
        assert!(err.is_network_class());

        let err = CaptureError::NavigationFailed("net::ERR_NAME_NOT_RESOLVED".to_string());
        assert!(err.is_network_class());

        let err = CaptureError::CaptureFailed("target closed".to_string());
        assert!(!err.is_network_class());

        let err = CaptureError::Timeout(Duration::from_secs(20));
        assert!(!err.is_network_class());
    }

    #[test]
    fn network_error_labels() {
        assert_eq!(
            network_error_label("net::ERR_NAME_NOT_RESOLVED"),
            "name not resolved (ERR_NAME_NOT_RESOLVED)"
        );
        assert_eq!(network_error_label("something else"), "network error");
    }
}
