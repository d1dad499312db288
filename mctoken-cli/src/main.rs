mod cli;
mod config;
mod error;
mod files;

use std::process;

use clap::Parser;
use token_chain::{ProxyPool, TokenPipeline};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{cli::Args, config::AppConfig, error::Result};

/// Exit status used when the run is interrupted with Ctrl+C.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, PartialEq, Eq)]
enum RunStatus {
    Completed,
    Interrupted,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(args).await {
        Ok(RunStatus::Completed) => {}
        Ok(RunStatus::Interrupted) => process::exit(EXIT_INTERRUPTED),
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<RunStatus> {
    info!("mctoken v{} starting", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config)?;
    info!("------<>------");
    info!("input file: {}", config.input_file.display());
    info!("proxy file: {}", config.proxy_file.display());
    info!("output file: {}", config.output_file.display());
    info!("concurrent limit: {}", config.concurrent_limit);
    info!("------<>------");

    let chain_config = config.chain_config();
    let credentials = files::read_lines(&config.input_file)?;
    let proxy_lines = files::read_lines(&config.proxy_file)?;
    let proxies = ProxyPool::from_lines(&proxy_lines, &chain_config.http)?;
    let pipeline = TokenPipeline::new(chain_config, proxies)?;

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, cancelling remaining work");
            cancel.cancel();
        }
    });

    let report = pipeline.run(credentials).await;

    let written = files::write_lines(&config.output_file, report.token_strings())?;
    info!(
        "Saved {} tokens to {}",
        written,
        config.output_file.display()
    );

    if let Some(path) = &config.report_file {
        files::write_report(path, &report)?;
        info!(
            failures = report.failures().count(),
            "Failure report written to {}",
            path.display()
        );
    }

    if report.cancelled {
        warn!("Run was interrupted; output contains only completed tokens");
        return Ok(RunStatus::Interrupted);
    }

    info!("---- program complete ----");
    Ok(RunStatus::Completed)
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}
