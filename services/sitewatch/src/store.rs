//! History store - lightweight persistence for per-site check metrics.
//!
//! The whole metrics map is read, modified, and rewritten on each update.
//! There is no locking: concurrent runs against the same site id can lose
//! an update. One writer per site is the supported mode; different sites
//! are safe because each write replaces the file atomically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::Result;

/// Default directory for the persisted metrics file
pub const DEFAULT_STATE_DIR: &str = ".watch";

const METRICS_FILE: &str = "metrics.json";

/// Persisted metrics for one site
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub last_checksum: String,
    pub last_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_row_count: Option<u64>,
    /// Recent distinct checksums, oldest first, bounded to the site's
    /// history window
    #[serde(default)]
    pub checksum_history: Vec<String>,
}

/// Comparison of the current observation against the previous run.
/// `Default` is the all-clear value used when no history exists yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonResult {
    /// Checksum differs from the previous run
    pub changed: bool,
    /// Signed size change relative to the previous size; 0 without one
    pub size_change_pct: f64,
    pub size_dropped_50pct: bool,
    /// Changed content and a >50% size drop together - the strongest
    /// breakage signal
    pub anomaly: bool,
}

/// File-backed store for check history, keyed by site id
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    /// Load the full metrics map. A missing or unreadable file yields an
    /// empty map; stale history is preferable to refusing to run.
    pub fn load(&self) -> BTreeMap<String, HistoryRecord> {
        let path = self.metrics_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("metrics file not found: {}, starting fresh", path.display());
                return BTreeMap::new();
            }
            Err(e) => {
                error!("failed to read metrics file {}: {e}", path.display());
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("failed to parse metrics file {}: {e}", path.display());
                BTreeMap::new()
            }
        }
    }

    /// Metrics for one site, if it has been checked before
    pub fn record(&self, site_id: &str) -> Option<HistoryRecord> {
        self.load().remove(site_id)
    }

    /// Compare the current size and checksum against the previous run
    pub fn compare(
        &self,
        site_id: &str,
        current_size: u64,
        current_checksum: &str,
    ) -> ComparisonResult {
        let Some(previous) = self.record(site_id) else {
            debug!("no historical data for site: {site_id}");
            return ComparisonResult::default();
        };

        let changed = previous.last_checksum != current_checksum;
        let mut size_change_pct = 0.0;
        if previous.last_size > 0 {
            size_change_pct = (current_size as f64 - previous.last_size as f64)
                / previous.last_size as f64
                * 100.0;
        }
        let size_dropped_50pct = size_change_pct < -50.0;

        ComparisonResult {
            changed,
            size_change_pct,
            size_dropped_50pct,
            anomaly: changed && size_dropped_50pct,
        }
    }

    /// Update a site's metrics and persist the whole map.
    ///
    /// The checksum is appended to the history only when it differs from
    /// the most recently appended entry, so unchanged fetches do not grow
    /// the window. Write failures propagate; a run whose history cannot be
    /// persisted is a failed run.
    pub fn update(
        &self,
        site_id: &str,
        checksum: &str,
        size: u64,
        row_count: Option<u64>,
        window: usize,
    ) -> Result<HistoryRecord> {
        let mut all = self.load();
        let record = all.entry(site_id.to_string()).or_default();

        record.last_checksum = checksum.to_string();
        record.last_size = size;
        if let Some(rows) = row_count {
            record.last_row_count = Some(rows);
        }

        if record.checksum_history.last().map(String::as_str) != Some(checksum) {
            record.checksum_history.push(checksum.to_string());
        }
        if record.checksum_history.len() > window {
            let excess = record.checksum_history.len() - window;
            record.checksum_history.drain(..excess);
        }

        let snapshot = record.clone();
        self.save(&all)?;
        debug!(
            "saved metrics for {} sites to {}",
            all.len(),
            self.metrics_path().display()
        );
        Ok(snapshot)
    }

    /// Atomic whole-file write: serialize to a sibling tmp file, then
    /// rename over the real one.
    fn save(&self, all: &BTreeMap<String, HistoryRecord>) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!("{METRICS_FILE}.tmp"));
        std::fs::write(&tmp, serde_json::to_string_pretty(all)?)?;
        std::fs::rename(&tmp, self.metrics_path())?;
        Ok(())
    }
}
