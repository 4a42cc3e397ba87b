use clap::Parser;
use std::process;
use std::time::Duration;
use subprobe::cli::{self, Cli};
use subprobe::error::ProbeError;
use subprobe::lifecycle::LifecycleController;
use subprobe::{pipeline, report, Config};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    cli::setup_logging(args.verbose);

    info!("starting subprobe v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            process::exit(1);
        }
    };

    if let Err(err) = args.validate(config.screenshot_mode) {
        error!("{err}");
        process::exit(1);
    }

    let raw_targets = match cli::load_targets(&args.targets).await {
        Ok(targets) => targets,
        Err(err) => {
            error!("{err}");
            process::exit(1);
        }
    };

    let targets = pipeline::dedup_targets(&raw_targets);
    if targets.is_empty() {
        error!("{}", ProbeError::NoTargets);
        process::exit(1);
    }

    info!(
        targets = targets.len(),
        concurrency = config.concurrency,
        timeout = ?config.timeout,
        "starting probe run"
    );

    let controller = LifecycleController::new(config.clone());
    let run_report = match controller.run(targets).await {
        Ok(report) => report,
        Err(ProbeError::Interrupted) => process::exit(130),
        Err(err) => {
            error!("{err}");
            process::exit(1);
        }
    };

    report::print_summary(&run_report, &config);

    if let Some(path) = &args.output {
        match report::write_csv(&run_report, path) {
            Ok(()) => info!("results written to {}", path.display()),
            Err(err) => warn!("failed to write CSV {}: {err}", path.display()),
        }
    }

    if let Some(path) = &args.excel {
        match report::write_xlsx(&run_report, path, args.only_alive) {
            Ok(()) => info!("workbook written to {}", path.display()),
            Err(err) => warn!("failed to write workbook {}: {err}", path.display()),
        }
    }

    if let Some(path) = &args.html {
        match report::write_html(&run_report, path, args.only_alive) {
            Ok(()) => info!("HTML report written to {}", path.display()),
            Err(err) => warn!("failed to write HTML report {}: {err}", path.display()),
        }
    }
}

/// Optional JSON config file, overridden by whichever CLI flags were given.
async fn load_config(args: &Cli) -> Result<Config, ProbeError> {
    let mut config = if let Some(path) = &args.config {
        let content = tokio::fs::read_to_string(path).await.map_err(|err| {
            ProbeError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|err| {
            ProbeError::Configuration(format!("invalid config {}: {err}", path.display()))
        })?
    } else {
        Config::default()
    };

    if let Some(timeout) = args.timeout {
        config.timeout = Duration::from_secs(timeout);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if args.follow {
        config.follow_redirects = true;
    }
    if args.extract {
        config.extract_info = true;
    }
    if let Some(mode) = args.screenshot_mode() {
        config.screenshot_mode = mode;
    }
    if let Some(dir) = &args.screenshot_dir {
        config.screenshot_dir = dir.clone();
    }
    if let Some(chrome_path) = &args.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }

    config.validate()?;
    Ok(config)
}
