//! Sitewatch - a health watchdog for remote data-ingestion sources.
//!
//! One invocation fetches a configured endpoint, validates structural
//! expectations about its content (markup selectors, tabular schemas,
//! size floors), compares size and checksum against the previous
//! observation, classifies the outcome as INFO/WARN/FAIL and escalates it
//! through a notification chain (email, webhook, console). The process
//! exits with the severity-derived status code: 0, 2 or 3.

pub mod checks;
pub mod config;
pub mod error;
pub mod fetch;
pub mod notify;
pub mod runner;
pub mod severity;
pub mod store;

pub use checks::{
    checksum_sha256, content_type_matches, status_ok, Capabilities, CheckEngine, CheckReport,
    SchemaCheck, SelectorCheck,
};
pub use config::{load_config, resolve_config_path, ContentKind, NotifyConfig, SiteConfig};
pub use error::{Result, WatchError};
pub use fetch::{Fetch, FetchResult, HttpFetcher};
pub use notify::{format_summary, notify, print_report, NotificationChannel};
pub use runner::run_site_check;
pub use severity::{classify, Severity};
pub use store::{ComparisonResult, HistoryRecord, HistoryStore, DEFAULT_STATE_DIR};
