//! Watch configuration - loads and validates per-site health check settings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Result, WatchError};

/// The kind of content a monitored endpoint is expected to serve.
///
/// Closed set; config entries naming any other kind are rejected at load
/// time, not at check time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Html,
    Csv,
    Excel,
    Pdf,
    Binary,
}

/// Notification channel configuration.
///
/// Each field names the *environment variable* that holds the actual
/// address or URL, so secrets never live in the config file itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Environment variable holding the recipient email address
    #[serde(default)]
    pub email_env: Option<String>,
    /// Environment variable holding the webhook URL
    #[serde(default)]
    pub webhook_env: Option<String>,
}

/// Configuration for one monitored site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub url: String,
    pub content_kind: ContentKind,
    /// CSS selectors that must be present (html only)
    #[serde(default)]
    pub selectors: Vec<String>,
    /// Minimum acceptable body size in bytes
    #[serde(default)]
    pub min_bytes: u64,
    /// Header columns that must be present (csv/excel only)
    #[serde(default)]
    pub expected_columns: Vec<String>,
    /// Minimum number of data rows, excluding the header; 0 disables the check
    #[serde(default)]
    pub min_rows: u64,
    /// Case-insensitive substring expected in the Content-Type header
    #[serde(default)]
    pub expected_content_type: Option<String>,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// Number of historical checksums retained for drift inspection
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default)]
    pub notify_channels: NotifyConfig,
}

fn default_verify_tls() -> bool {
    true
}

fn default_history_window() -> usize {
    10
}

/// Default production config path, relative to the working directory
pub const CONFIG_PATH: &str = "configs/watch.json";

/// Example config shipped with the repository, used as a fallback
pub const EXAMPLE_CONFIG_PATH: &str = "configs/watch.example.json";

/// Resolve the config path to load when none was given explicitly.
///
/// Prefers `configs/watch.json` under `base`, falling back to the shipped
/// example file with a warning. Fails with `ConfigNotFound` when neither
/// exists.
pub fn resolve_config_path(base: &Path) -> Result<PathBuf> {
    let production = base.join(CONFIG_PATH);
    if production.exists() {
        return Ok(production);
    }
    let example = base.join(EXAMPLE_CONFIG_PATH);
    if example.exists() {
        warn!(
            "using example config file {}; create {} for production",
            example.display(),
            production.display()
        );
        return Ok(example);
    }
    Err(WatchError::ConfigNotFound(production))
}

/// Load the watch configuration, returning a map of site id to settings.
///
/// A file that is not valid JSON fails the whole load. A single malformed
/// site entry is logged and dropped so one broken entry cannot disable
/// monitoring for every other site.
pub fn load_config(path: Option<&Path>) -> Result<BTreeMap<String, SiteConfig>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => resolve_config_path(Path::new("."))?,
    };

    if matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    ) {
        return Err(WatchError::UnsupportedConfigFormat(path));
    }

    let raw = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WatchError::ConfigNotFound(path.clone())
        } else {
            WatchError::Io(e)
        }
    })?;

    let entries: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&raw).map_err(|source| WatchError::ConfigParse {
            path: path.clone(),
            source,
        })?;

    let mut sites = BTreeMap::new();
    for (site_id, value) in entries {
        match parse_site(&site_id, value) {
            Ok(config) => {
                sites.insert(site_id, config);
            }
            Err(reason) => {
                error!("invalid config for site {site_id}: {reason}");
            }
        }
    }

    info!(
        "loaded health config: {} sites configured from {}",
        sites.len(),
        path.display()
    );
    Ok(sites)
}

fn parse_site(site_id: &str, value: serde_json::Value) -> std::result::Result<SiteConfig, String> {
    let config: SiteConfig = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if config.url.is_empty() {
        return Err(format!("field 'url' must be non-empty for site {site_id}"));
    }
    if config.history_window == 0 {
        return Err(format!(
            "field 'history_window' must be at least 1 for site {site_id}"
        ));
    }
    Ok(config)
}
