//! HTTP(S) liveness probing.
//!
//! One shared, connection-pooled client issues at most two requests per
//! target (HTTPS, then an HTTP fallback when the transport fails outright)
//! and folds every outcome, transport errors included, into a
//! `ProbeResult`. A probe never fails and never panics.

use crate::analyzer::{self, PageCategory};
use crate::Config;
use reqwest::redirect::Policy;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

/// Liveness category derived from an HTTP status or a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Alive,
    Redirect,
    Forbidden,
    NotFound,
    ServerError,
    GatewayError,
    Unavailable,
    Unreachable,
}

impl Classification {
    /// Exact status mapping. Returns the classification and the alive flag.
    pub fn from_status(status: u16) -> (Self, bool) {
        match status {
            200 => (Classification::Alive, true),
            301 | 302 => (Classification::Redirect, true),
            403 => (Classification::Forbidden, false),
            404 => (Classification::NotFound, false),
            500 => (Classification::ServerError, false),
            502 => (Classification::GatewayError, false),
            503 => (Classification::Unavailable, false),
            s if s < 400 => (Classification::Alive, true),
            _ => (Classification::Unreachable, false),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Alive => "alive",
            Classification::Redirect => "redirect",
            Classification::Forbidden => "forbidden",
            Classification::NotFound => "not found",
            Classification::ServerError => "server error",
            Classification::GatewayError => "gateway error",
            Classification::Unavailable => "unavailable",
            Classification::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One probe outcome per deduplicated input target. Immutable once it leaves
/// the probing worker.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Scheme-qualified URL the attempt that produced this result went to
    pub target: String,
    /// Status code, 0 when the request never completed
    pub http_status: u16,
    pub classification: Classification,
    pub is_alive: bool,
    /// Reason phrase for HTTP outcomes, error text for transport failures
    pub message: String,
    /// Wall time of the attempt that produced this result
    pub latency: Duration,
    pub page_category: Option<PageCategory>,
    pub page_title: String,
    /// Confirmed screenshot artifact, filled in by the pipeline
    pub screenshot: Option<PathBuf>,
}

impl ProbeResult {
    fn from_status(target: String, status: u16, latency: Duration) -> Self {
        let (classification, is_alive) = Classification::from_status(status);
        Self {
            target,
            http_status: status,
            classification,
            is_alive,
            message: String::new(),
            latency,
            page_category: None,
            page_title: String::new(),
            screenshot: None,
        }
    }

    fn from_transport_error(target: String, message: String, latency: Duration) -> Self {
        Self {
            target,
            http_status: 0,
            classification: Classification::Unreachable,
            is_alive: false,
            message,
            latency,
            page_category: None,
            page_title: String::new(),
            screenshot: None,
        }
    }
}

/// Liveness prober with a shared keep-alive connection pool.
pub struct Prober {
    client: reqwest::Client,
    config: Config,
}

impl Prober {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let redirect = if config.follow_redirects {
            Policy::limited(10)
        } else {
            Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .redirect(redirect);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build()?,
            config: config.clone(),
        })
    }

    /// Probe one target. Scheme-qualified targets get exactly one attempt;
    /// bare hosts try HTTPS first and fall back to HTTP only when the HTTPS
    /// transport fails outright. Each attempt has its own timeout budget.
    pub async fn probe(&self, raw: &str) -> ProbeResult {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return match self.attempt(raw).await {
                Ok(result) => result,
                Err((message, latency)) => {
                    ProbeResult::from_transport_error(raw.to_string(), message, latency)
                }
            };
        }

        let https_target = format!("https://{raw}");
        match self.attempt(&https_target).await {
            Ok(result) => result,
            Err((https_error, _)) => {
                debug!(target = %https_target, error = %https_error, "https transport failed, retrying over http");
                let http_target = format!("http://{raw}");
                match self.attempt(&http_target).await {
                    Ok(result) => result,
                    Err((message, latency)) => {
                        ProbeResult::from_transport_error(http_target, message, latency)
                    }
                }
            }
        }
    }

    /// One request. A completed transport (any status code) is `Ok`; a
    /// transport failure carries the error text and the attempt's elapsed
    /// time so the caller can decide whether to fall back.
    async fn attempt(&self, url: &str) -> Result<ProbeResult, (String, Duration)> {
        let start = Instant::now();
        match self.client.get(url).send().await {
            Ok(response) => {
                let latency = start.elapsed();
                let status = response.status();
                let mut result = ProbeResult::from_status(url.to_string(), status.as_u16(), latency);
                result.message = status.canonical_reason().unwrap_or_default().to_string();

                if self.config.extract_info && status.as_u16() < 400 {
                    if let Ok(body) = read_body_capped(response, self.config.max_body_bytes).await {
                        let (category, title) = analyzer::analyze(&body);
                        result.page_category = category;
                        result.page_title = title;
                    }
                }

                Ok(result)
            }
            Err(err) => Err((error_text(&err), start.elapsed())),
        }
    }
}

/// Read at most `cap` bytes of the body; huge pages must not blow up memory.
async fn read_body_capped(
    mut response: reqwest::Response,
    cap: usize,
) -> Result<String, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = cap - buf.len();
        if chunk.len() >= remaining {
            buf.extend_from_slice(&chunk[..remaining]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Innermost source message of a reqwest error; the outer layers only say
/// "error sending request".
fn error_text(err: &reqwest::Error) -> String {
    let mut source = std::error::Error::source(err);
    let mut last = None;
    while let Some(inner) = source {
        last = Some(inner.to_string());
        source = inner.source();
    }
    last.unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_status_mapping() {
        let expectations = [
            (200, Classification::Alive, true),
            (301, Classification::Redirect, true),
            (302, Classification::Redirect, true),
            (403, Classification::Forbidden, false),
            (404, Classification::NotFound, false),
            (500, Classification::ServerError, false),
            (502, Classification::GatewayError, false),
            (503, Classification::Unavailable, false),
        ];
        for (status, classification, alive) in expectations {
            assert_eq!(
                Classification::from_status(status),
                (classification, alive),
                "status {status}"
            );
        }
    }

    #[test]
    fn other_codes_alive_iff_below_400() {
        for status in [100, 101, 201, 204, 206, 304, 307, 308, 399] {
            let (classification, alive) = Classification::from_status(status);
            assert!(alive, "status {status} should be alive");
            assert_eq!(classification, Classification::Alive);
        }
        for status in [400, 401, 405, 418, 429, 501, 504, 599] {
            let (classification, alive) = Classification::from_status(status);
            assert!(!alive, "status {status} should not be alive");
            assert_eq!(classification, Classification::Unreachable);
        }
    }

    #[test]
    fn classification_is_idempotent() {
        for status in [200, 301, 403, 404, 500, 502, 503, 999] {
            assert_eq!(
                Classification::from_status(status),
                Classification::from_status(status)
            );
        }
    }
}
