//! Structural content checks - validates fetched bytes against the
//! expectations declared in a site's configuration.
//!
//! The engine never fails: every internal problem is downgraded into a
//! `valid = false` sub-result with a human-readable error string, so a
//! malformed payload is a finding, not a crash.

use std::collections::HashMap;

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};

use crate::config::{ContentKind, SiteConfig};
use crate::fetch::FetchResult;

/// Optional parsing capabilities, resolved once at startup and injected
/// into the engine so capability-unavailable paths stay unit-testable.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// CSS selector engine for html checks; substring matching otherwise
    pub html_selectors: bool,
    /// Spreadsheet parsing for excel schema checks
    pub excel: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            html_selectors: true,
            excel: cfg!(feature = "excel"),
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

/// Per-selector presence results for an html check
#[derive(Debug, Clone)]
pub struct SelectorCheck {
    /// True when every selector was found
    pub valid: bool,
    /// Selector to found flag, in config order
    pub found: Vec<(String, bool)>,
    pub error: Option<String>,
}

/// Header/row validation results for a tabular (csv/excel) check
#[derive(Debug, Clone)]
pub struct SchemaCheck {
    pub valid: bool,
    /// True when the check could not run because the parsing capability is
    /// unavailable; never escalates severity on its own
    pub skipped: bool,
    pub found_columns: Vec<String>,
    pub missing_columns: Vec<String>,
    /// Data rows, excluding the header
    pub row_count: u64,
    pub row_count_valid: bool,
    pub error: Option<String>,
}

impl Default for SchemaCheck {
    fn default() -> Self {
        Self {
            valid: false,
            skipped: false,
            found_columns: Vec::new(),
            missing_columns: Vec::new(),
            row_count: 0,
            row_count_valid: true,
            error: None,
        }
    }
}

impl SchemaCheck {
    fn skipped(message: &str) -> Self {
        Self {
            skipped: true,
            error: Some(message.to_string()),
            ..Self::default()
        }
    }
}

/// The outcome of one check run. Ephemeral; the checksum is attached by the
/// runner after hashing the fetched bytes.
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// URL after redirects
    pub url: String,
    pub status: u16,
    pub size_bytes: u64,
    pub status_ok: bool,
    pub min_bytes_ok: bool,
    /// Present only when the site declares an expected content type
    pub content_type_ok: Option<bool>,
    /// Present only for html sites with selectors configured
    pub selectors: Option<SelectorCheck>,
    /// Present only for csv/excel sites with schema expectations configured
    pub schema: Option<SchemaCheck>,
    pub row_count: Option<u64>,
    pub checksum: Option<String>,
}

/// Runs structural validations against fetched content
pub struct CheckEngine {
    caps: Capabilities,
}

impl CheckEngine {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }

    /// Validate one fetched response against the site's declared
    /// expectations. Branches on the declared content kind; pdf and binary
    /// sites get the common checks only.
    pub fn run(&self, site: &SiteConfig, fetched: &FetchResult) -> CheckReport {
        let size_bytes = fetched.body.len() as u64;
        let mut report = CheckReport {
            url: fetched.final_url.clone(),
            status: fetched.status,
            size_bytes,
            status_ok: status_ok(fetched.status),
            min_bytes_ok: size_bytes >= site.min_bytes,
            content_type_ok: None,
            selectors: None,
            schema: None,
            row_count: None,
            checksum: None,
        };

        if let Some(expected) = &site.expected_content_type {
            report.content_type_ok = Some(content_type_matches(&fetched.headers, expected));
        }

        let min_rows = (site.min_rows > 0).then_some(site.min_rows);
        let wants_schema = !site.expected_columns.is_empty() || min_rows.is_some();

        match site.content_kind {
            ContentKind::Html => {
                if !site.selectors.is_empty() {
                    report.selectors = Some(self.check_selectors(&fetched.body, &site.selectors));
                }
            }
            ContentKind::Csv => {
                if wants_schema {
                    let schema =
                        check_csv_schema(&fetched.body, &site.expected_columns, min_rows);
                    report.row_count = Some(schema.row_count);
                    report.schema = Some(schema);
                }
            }
            ContentKind::Excel => {
                if wants_schema {
                    let schema =
                        self.check_excel_schema(&fetched.body, &site.expected_columns, min_rows);
                    if !schema.skipped {
                        report.row_count = Some(schema.row_count);
                    }
                    report.schema = Some(schema);
                }
            }
            ContentKind::Pdf | ContentKind::Binary => {}
        }

        report
    }

    fn check_selectors(&self, body: &[u8], selectors: &[String]) -> SelectorCheck {
        let text = String::from_utf8_lossy(body);
        let mut found = Vec::with_capacity(selectors.len());
        let mut error = None;

        if self.caps.html_selectors {
            let document = Html::parse_document(&text);
            for raw in selectors {
                match Selector::parse(raw) {
                    Ok(selector) => {
                        found.push((raw.clone(), document.select(&selector).next().is_some()));
                    }
                    Err(e) => {
                        if error.is_none() {
                            error = Some(format!("invalid selector '{raw}': {e}"));
                        }
                        found.push((raw.clone(), false));
                    }
                }
            }
        } else {
            // Selector engine unavailable: plain substring containment
            for raw in selectors {
                found.push((raw.clone(), text.contains(raw.as_str())));
            }
        }

        let valid = found.iter().all(|(_, hit)| *hit);
        SelectorCheck {
            valid,
            found,
            error,
        }
    }

    fn check_excel_schema(
        &self,
        content: &[u8],
        expected_columns: &[String],
        min_rows: Option<u64>,
    ) -> SchemaCheck {
        if !self.caps.excel {
            return SchemaCheck::skipped("excel support not available - schema check skipped");
        }

        #[cfg(feature = "excel")]
        {
            check_excel_schema_impl(content, expected_columns, min_rows)
        }

        #[cfg(not(feature = "excel"))]
        {
            let _ = (content, expected_columns, min_rows);
            SchemaCheck::skipped("excel support not compiled in - schema check skipped")
        }
    }
}

/// True for any 2xx status code
pub fn status_ok(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Case-insensitive substring test against the Content-Type header.
/// A missing header never matches.
pub fn content_type_matches(headers: &HashMap<String, String>, expected: &str) -> bool {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.to_lowercase().contains(&expected.to_lowercase()))
        .unwrap_or(false)
}

/// SHA-256 digest of the exact fetched bytes as a 64-char lower-hex string
pub fn checksum_sha256(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    format!("{digest:x}")
}

/// Detect the field delimiter by counting candidates in the first line of
/// a sample (first 1 KiB). Comma wins on ambiguity.
fn sniff_delimiter(text: &str) -> u8 {
    let mut end = text.len().min(1024);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let first_line = text[..end].lines().next().unwrap_or("");

    let mut best = b',';
    let mut best_count = 0usize;
    for candidate in [b',', b';', b'\t', b'|'] {
        let count = first_line.matches(candidate as char).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Validate a CSV payload's header columns and row count
pub fn check_csv_schema(
    content: &[u8],
    expected_columns: &[String],
    min_rows: Option<u64>,
) -> SchemaCheck {
    let mut result = SchemaCheck::default();
    if expected_columns.is_empty() && min_rows.is_none() {
        result.valid = true;
        return result;
    }

    let text = String::from_utf8_lossy(content);
    let delimiter = sniff_delimiter(&text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let found_columns: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(|h| h.to_string()).collect(),
        Err(e) => {
            result.error = Some(format!("CSV parsing error: {e}"));
            return result;
        }
    };

    let mut row_count = 0u64;
    for record in reader.records() {
        if let Err(e) = record {
            result.found_columns = found_columns;
            result.error = Some(format!("CSV parsing error: {e}"));
            return result;
        }
        row_count += 1;
    }

    finish_schema(result, found_columns, row_count, expected_columns, min_rows)
}

/// Shared tail of the csv and excel schema checks: column diff, row-count
/// threshold, and the combined valid flag.
fn finish_schema(
    mut result: SchemaCheck,
    found_columns: Vec<String>,
    row_count: u64,
    expected_columns: &[String],
    min_rows: Option<u64>,
) -> SchemaCheck {
    result.missing_columns = expected_columns
        .iter()
        .filter(|c| !found_columns.contains(c))
        .cloned()
        .collect();
    result.found_columns = found_columns;
    result.row_count = row_count;
    result.valid = result.missing_columns.is_empty();

    if let Some(min) = min_rows {
        result.row_count_valid = row_count >= min;
        if !result.row_count_valid {
            result.valid = false;
            result.error = Some(format!("Expected at least {min} rows, got {row_count}"));
        }
    }

    result
}

/// Validate an Excel payload's first sheet: header from row 1, data rows
/// below it.
#[cfg(feature = "excel")]
fn check_excel_schema_impl(
    content: &[u8],
    expected_columns: &[String],
    min_rows: Option<u64>,
) -> SchemaCheck {
    use calamine::Reader;

    let result = SchemaCheck::default();
    let cursor = std::io::Cursor::new(content.to_vec());
    let mut workbook = match calamine::open_workbook_auto_from_rs(cursor) {
        Ok(wb) => wb,
        Err(e) => {
            return SchemaCheck {
                error: Some(format!("Excel parsing error: {e}")),
                ..result
            };
        }
    };

    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => {
            return SchemaCheck {
                error: Some(format!("Excel parsing error: {e}")),
                ..result
            };
        }
        None => {
            return SchemaCheck {
                error: Some("Excel parsing error: workbook has no sheets".to_string()),
                ..result
            };
        }
    };

    let found_columns: Vec<String> = range
        .rows()
        .next()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .unwrap_or_default();
    let row_count = (range.height() as u64).saturating_sub(1);

    finish_schema(result, found_columns, row_count, expected_columns, min_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter_comma_default() {
        assert_eq!(sniff_delimiter("name age city"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_sniff_delimiter_semicolon() {
        assert_eq!(sniff_delimiter("name;age;city\n1;2;3"), b';');
    }

    #[test]
    fn test_sniff_delimiter_tab() {
        assert_eq!(sniff_delimiter("name\tage\tcity"), b'\t');
    }

    #[test]
    fn test_sniff_delimiter_only_samples_first_line() {
        // Semicolons below the first line must not win
        assert_eq!(sniff_delimiter("a,b\nx;y;z;w;v\n"), b',');
    }

    #[test]
    fn test_checksum_is_lower_hex() {
        let digest = checksum_sha256(b"hello");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
