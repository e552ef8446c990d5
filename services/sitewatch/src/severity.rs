//! Severity classification - maps check results and historical signals to
//! the three-level outcome a run exits with.

use crate::checks::CheckReport;
use crate::store::ComparisonResult;

/// Run outcome, ordered INFO < WARN < FAIL
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Fail,
}

impl Severity {
    /// Externally visible status code: 0, 2 or 3
    pub fn exit_code(self) -> i32 {
        match self {
            Severity::Info => 0,
            Severity::Warn => 2,
            Severity::Fail => 3,
        }
    }

    /// Marker prefixed to notification titles
    pub fn marker(self) -> &'static str {
        match self {
            Severity::Info => "✅",
            Severity::Warn => "⚠️",
            Severity::Fail => "❌",
        }
    }

    /// Attachment color for webhook payloads
    pub fn color(self) -> &'static str {
        match self {
            Severity::Info => "#36a64f",
            Severity::Warn => "#ff9900",
            Severity::Fail => "#ff0000",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warn => write!(f, "WARN"),
            Severity::Fail => write!(f, "FAIL"),
        }
    }
}

/// Decide the severity of a run. Pure; first matching rule wins.
///
/// Hard check failures outrank historical drift signals, and a schema
/// check that was skipped for lack of a parsing capability never fails a
/// run by itself.
pub fn classify(report: &CheckReport, comparison: &ComparisonResult) -> Severity {
    if !report.status_ok {
        return Severity::Fail;
    }
    if !report.min_bytes_ok {
        return Severity::Fail;
    }
    if let Some(schema) = &report.schema {
        if !schema.valid && !schema.skipped {
            return Severity::Fail;
        }
    }
    if let Some(selectors) = &report.selectors {
        if !selectors.valid {
            return Severity::Fail;
        }
    }
    if comparison.anomaly {
        return Severity::Warn;
    }
    if comparison.size_dropped_50pct {
        return Severity::Warn;
    }
    Severity::Info
}
