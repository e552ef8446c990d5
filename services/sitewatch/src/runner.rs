//! Run orchestration - sequences one full site check from config lookup to
//! status code.

use std::path::Path;

use tracing::{error, info};

use crate::checks::{checksum_sha256, CheckEngine};
use crate::config;
use crate::error::{Result, WatchError};
use crate::fetch::Fetch;
use crate::notify;
use crate::severity::{classify, Severity};
use crate::store::HistoryStore;

/// Run a health check for one site and return its status code
/// (0 = INFO, 2 = WARN, 3 = FAIL).
///
/// Never panics or errors out: any failure in the sequence is logged and
/// converted to the FAIL status code. In dry-run mode the report is
/// printed instead of dispatched, but history is still persisted.
pub async fn run_site_check(
    fetcher: &dyn Fetch,
    store: &HistoryStore,
    engine: &CheckEngine,
    site_id: &str,
    config_path: Option<&Path>,
    dry_run: bool,
) -> i32 {
    match check_site(fetcher, store, engine, site_id, config_path, dry_run).await {
        Ok(code) => code,
        Err(e) => {
            error!("health check failed for {site_id}: {e}");
            Severity::Fail.exit_code()
        }
    }
}

async fn check_site(
    fetcher: &dyn Fetch,
    store: &HistoryStore,
    engine: &CheckEngine,
    site_id: &str,
    config_path: Option<&Path>,
    dry_run: bool,
) -> Result<i32> {
    let sites = config::load_config(config_path)?;
    let site = sites
        .get(site_id)
        .ok_or_else(|| WatchError::UnknownSite(site_id.to_string()))?;

    info!("fetching {site_id}...");
    let fetched = match fetcher.fetch(&site.url, site.verify_tls).await {
        Ok(fetched) => fetched,
        Err(e) => {
            error!("failed to fetch {site_id}: {e}");
            if !dry_run {
                let title = format!("Health check: {site_id} - fetch failed");
                let body = format!("URL: {}\nError: {e}", site.url);
                notify::notify(&site.notify_channels, &title, &body, Severity::Fail).await;
            }
            return Ok(Severity::Fail.exit_code());
        }
    };

    let mut report = engine.run(site, &fetched);
    let checksum = checksum_sha256(&fetched.body);
    report.checksum = Some(checksum.clone());

    let comparison = store.compare(site_id, report.size_bytes, &checksum);
    let severity = classify(&report, &comparison);

    // Persists in every mode, including dry runs
    store.update(
        site_id,
        &checksum,
        report.size_bytes,
        report.row_count,
        site.history_window,
    )?;

    let title = format!("Health check: {site_id}");
    let body = notify::format_summary(&report, &comparison);

    if dry_run {
        notify::print_report(&title, &body, severity);
        Ok(severity.exit_code())
    } else {
        Ok(notify::notify(&site.notify_channels, &title, &body, severity).await)
    }
}
