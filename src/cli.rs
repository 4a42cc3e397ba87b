use crate::error::ProbeError;
use crate::ScreenshotMode;
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "subprobe")]
#[command(about = "Bounded-concurrency domain liveness prober with page classification and screenshots")]
#[command(version)]
pub struct Cli {
    #[arg(
        value_name = "TARGETS",
        help = "File with one domain per line, or a comma-separated domain list"
    )]
    pub targets: String,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Per-attempt request timeout in seconds (default 10)")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Number of concurrent probe workers (default 10)")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Follow redirects instead of recording the first response")]
    pub follow: bool,

    #[arg(long, help = "Extract page title and category from response bodies")]
    pub extract: bool,

    #[arg(long, help = "Capture a screenshot of every target")]
    pub screenshot: bool,

    #[arg(
        long,
        conflicts_with = "screenshot",
        help = "Capture screenshots of alive targets only"
    )]
    pub screenshot_alive: bool,

    #[arg(long, help = "Directory for captured screenshots (default: screenshots)")]
    pub screenshot_dir: Option<PathBuf>,

    #[arg(long, help = "Write results to a CSV file")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Write results to an Excel workbook")]
    pub excel: Option<PathBuf>,

    #[arg(long, help = "Write an HTML report")]
    pub html: Option<PathBuf>,

    #[arg(long, help = "Restrict exports to alive targets")]
    pub only_alive: bool,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Chrome/Chromium executable path")]
    pub chrome_path: Option<String>,
}

impl Cli {
    pub fn screenshot_mode(&self) -> Option<ScreenshotMode> {
        if self.screenshot {
            Some(ScreenshotMode::All)
        } else if self.screenshot_alive {
            Some(ScreenshotMode::AliveOnly)
        } else {
            None
        }
    }

    /// Flag-combination checks that must fail before any pipeline work.
    pub fn validate(&self, mode: ScreenshotMode) -> Result<(), ProbeError> {
        if mode.enabled() && self.excel.is_none() && self.html.is_none() {
            return Err(ProbeError::MissingScreenshotOutput);
        }
        Ok(())
    }
}

/// Load raw targets from the positional argument: a file when one exists at
/// that path, otherwise a comma-separated inline list. File lines are
/// trimmed; blanks and `#` comments are skipped.
pub async fn load_targets(input: &str) -> Result<Vec<String>, ProbeError> {
    if Path::new(input).exists() {
        let content =
            tokio::fs::read_to_string(input)
                .await
                .map_err(|source| ProbeError::TargetSource {
                    path: input.to_string(),
                    source,
                })?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect())
    } else {
        Ok(input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect())
    }
}

pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_list_is_split_and_trimmed() {
        let targets = load_targets("a.com, b.com ,, c.com").await.unwrap();
        assert_eq!(targets, vec!["a.com", "b.com", "c.com"]);
    }

    #[tokio::test]
    async fn file_lines_skip_comments_and_blanks() {
        let dir = std::env::temp_dir().join(format!("subprobe-cli-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("targets.txt");
        tokio::fs::write(&path, "a.com\n# comment\n\n  b.com  \n")
            .await
            .unwrap();

        let targets = load_targets(path.to_str().unwrap()).await.unwrap();
        assert_eq!(targets, vec!["a.com", "b.com"]);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn screenshot_mode_requires_an_output() {
        let cli = Cli::parse_from(["subprobe", "--screenshot", "a.com"]);
        assert!(cli.validate(ScreenshotMode::All).is_err());

        let cli = Cli::parse_from(["subprobe", "--screenshot", "--html", "report.html", "a.com"]);
        assert!(cli.validate(ScreenshotMode::All).is_ok());

        let cli = Cli::parse_from(["subprobe", "a.com"]);
        assert!(cli.validate(ScreenshotMode::None).is_ok());
    }

    #[test]
    fn screenshot_flags_map_to_modes() {
        let cli = Cli::parse_from(["subprobe", "--screenshot", "a.com"]);
        assert_eq!(cli.screenshot_mode(), Some(ScreenshotMode::All));

        let cli = Cli::parse_from(["subprobe", "--screenshot-alive", "a.com"]);
        assert_eq!(cli.screenshot_mode(), Some(ScreenshotMode::AliveOnly));

        let cli = Cli::parse_from(["subprobe", "a.com"]);
        assert_eq!(cli.screenshot_mode(), None);
    }
}
