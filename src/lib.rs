//! # subprobe
//!
//! A bounded-concurrency domain liveness prober. Given a list of hostnames,
//! subprobe determines whether each serves HTTP(S), classifies the outcome,
//! optionally extracts page metadata, and optionally captures a rendered
//! screenshot, streaming results as they complete instead of waiting for the
//! whole batch.
//!
//! Two independently sized pools do the work: a cheap, highly parallel HTTP
//! probing pool and an expensive browser-rendering pool whose size is derived
//! from the host's CPU and memory. A bounded queue joins them so a saturated
//! rendering pool can never deadlock the probing side.
//!
//! ## Features
//!
//! - **HTTPS-first probing**: bare hosts try HTTPS, falling back to HTTP only
//!   when the transport fails outright; a completed response is always final
//! - **Exact status classification**: alive/redirect/forbidden/not found/
//!   server error/gateway error/unavailable/unreachable
//! - **Page analysis**: title extraction and login/admin/API/upload
//!   categorization from response bodies
//! - **Screenshot pool**: one isolated headless chromium per rendering
//!   worker, soft-failure placeholders for unreachable targets, retry with
//!   linear backoff
//! - **Graceful lifecycle**: signal handling, panic-safe cleanup, and a sweep
//!   for stray renderer processes on every exit path
//! - **Reports**: stdout summary, CSV, Excel workbook with embedded
//!   screenshots, and a standalone HTML report
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use subprobe::{Config, Prober};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let prober = Prober::new(&config)?;
//!
//!     let result = prober.probe("example.com").await;
//!     println!("{} -> {} ({})", result.target, result.classification, result.http_status);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI usage
//!
//! ```bash
//! # probe a list of domains from a file
//! subprobe domains.txt --concurrency 50 --extract --output results.csv
//!
//! # capture screenshots of alive targets into an HTML report
//! subprobe domains.txt --screenshot-alive --html report.html
//! ```

/// Pure page classification and title extraction
pub mod analyzer;

/// Screenshot engine: browser worker pool with bounded submission
pub mod capture;

/// Command-line interface and target loading
pub mod cli;

/// Configuration and chromium instance settings
pub mod config;

/// Error types and soft-failure classification
pub mod error;

/// Run lifecycle: sizing, signals, panic guard, process cleanup
pub mod lifecycle;

/// Dispatcher, aggregator, and progress tracking
pub mod pipeline;

/// HTTP(S) liveness probing and status classification
pub mod probe;

/// Report writers: summary, CSV, XLSX, HTML
pub mod report;

/// System-resource detection and pool sizing
pub mod resources;

#[cfg(test)]
mod tests;

pub use analyzer::*;
pub use capture::*;
pub use config::*;
pub use error::*;
pub use lifecycle::*;
pub use pipeline::*;
pub use probe::*;
pub use resources::*;
