//! Sitewatch CLI
//!
//! Runs one health check for one configured site and exits with the
//! severity-derived status code: 0 (INFO), 2 (WARN) or 3 (FAIL), or 130
//! when interrupted.

use std::path::PathBuf;

use clap::Parser;
use sitewatch::{run_site_check, Capabilities, CheckEngine, HistoryStore, HttpFetcher};
use tracing::Level;

#[derive(Parser)]
#[command(name = "sitewatch")]
#[command(about = "Health check watchdog for scraping and ingestion sources")]
#[command(version)]
struct Args {
    /// Site identifier from the watch configuration
    site_id: String,

    /// Path to the config file (default: configs/watch.json, falling back
    /// to configs/watch.example.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the persisted check history
    #[arg(long, default_value = sitewatch::DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    /// Run all checks and update history but send no notifications
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(short, long, default_value = "info", value_parser = parse_log_level)]
    log_level: Level,
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid log level: {}. Use: trace, debug, info, warn, error",
            s
        )
    })
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::info!("starting health check for site: {}", args.site_id);
    if args.dry_run {
        tracing::info!("dry-run mode: no notifications will be sent");
    }

    let fetcher = HttpFetcher::default();
    let store = HistoryStore::new(&args.state_dir);
    let engine = CheckEngine::new(Capabilities::detect());

    let code = tokio::select! {
        code = run_site_check(
            &fetcher,
            &store,
            &engine,
            &args.site_id,
            args.config.as_deref(),
            args.dry_run,
        ) => {
            tracing::info!("health check completed with status code: {code}");
            code
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::error!("health check interrupted");
            130
        }
    };

    std::process::exit(code);
}
