//! Notification chain - escalates a check report through email, webhook
//! and finally the console.
//!
//! Channels are strategy objects tried in fixed priority order; the first
//! successful delivery wins. A channel whose secret is not present in the
//! environment is skipped without an attempt, and a failing channel falls
//! through to the next one. Delivery problems never escape this module:
//! the returned value is always the severity-derived status code.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info};

use crate::checks::CheckReport;
use crate::config::NotifyConfig;
use crate::severity::Severity;
use crate::store::ComparisonResult;

/// One delivery strategy in the notification chain
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Try to deliver; true means delivered. Must not panic or error out -
    /// failures are logged and reported as not delivered.
    async fn attempt(&self, title: &str, body: &str, severity: Severity) -> bool;
}

/// SMTP email delivery. Transport parameters come from `SMTP_HOST`,
/// `SMTP_PORT`, `SMTP_USER`, `SMTP_PASSWORD` and `SMTP_FROM`; credentials,
/// when present, switch the transport to STARTTLS with login.
pub struct EmailChannel {
    to: String,
}

impl EmailChannel {
    pub fn new(to: String) -> Self {
        Self { to }
    }

    async fn send(
        &self,
        title: &str,
        body: &str,
        severity: Severity,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let from = env::var("SMTP_FROM").unwrap_or_else(|_| "sitewatch@localhost".to_string());
        let subject = format!("{} {} - {}", severity.marker(), title, severity);
        let text = format!(
            "Health Check Report: {title}\n\nLevel: {severity}\n\n{body}\n\n---\nThis is an automated message from the sitewatch watchdog.\n"
        );
        let message = Message::builder()
            .from(from.parse()?)
            .to(self.to.parse()?)
            .subject(subject)
            .body(text)?;

        let host = env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(25);
        let user = env::var("SMTP_USER").ok();
        let password = env::var("SMTP_PASSWORD").ok();

        let mailer: AsyncSmtpTransport<Tokio1Executor> = match (user, password) {
            (Some(user), Some(password)) => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)?
                    .port(port)
                    .credentials(Credentials::new(user, password))
                    .build()
            }
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host)
                .port(port)
                .build(),
        };

        mailer.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn attempt(&self, title: &str, body: &str, severity: Severity) -> bool {
        match self.send(title, body, severity).await {
            Ok(()) => {
                info!("sent email notification to {}", self.to);
                true
            }
            Err(e) => {
                error!("failed to send email notification: {e}");
                false
            }
        }
    }
}

/// Incoming-webhook delivery with a Slack-style JSON payload
pub struct WebhookChannel {
    url: String,
}

impl WebhookChannel {
    pub fn new(url: String) -> Self {
        Self { url }
    }

    async fn send(&self, title: &str, body: &str, severity: Severity) -> reqwest::Result<()> {
        let payload = serde_json::json!({
            "username": "sitewatch",
            "text": format!("{} *{}*", severity.marker(), title),
            "attachments": [{
                "color": severity.color(),
                "fields": [
                    {"title": "Level", "value": severity.to_string(), "short": true},
                    {"title": "Summary", "value": body, "short": false},
                ],
                "footer": "sitewatch watchdog",
                "ts": chrono::Utc::now().timestamp(),
            }],
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn attempt(&self, title: &str, body: &str, severity: Severity) -> bool {
        match self.send(title, body, severity).await {
            Ok(()) => {
                info!("sent webhook notification for {title}");
                true
            }
            Err(e) => {
                error!("failed to send webhook notification: {e}");
                false
            }
        }
    }
}

/// Build the channel chain for a site, in priority order: email first,
/// then webhook. A channel is included only when its configured
/// environment variable resolves to a non-empty value.
pub fn resolve_channels(config: &NotifyConfig) -> Vec<Box<dyn NotificationChannel>> {
    let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

    if let Some(var) = &config.email_env {
        match env::var(var) {
            Ok(address) if !address.is_empty() => {
                channels.push(Box::new(EmailChannel::new(address)));
            }
            _ => debug!("email channel skipped: ${var} is not set"),
        }
    }
    if let Some(var) = &config.webhook_env {
        match env::var(var) {
            Ok(url) if !url.is_empty() => {
                channels.push(Box::new(WebhookChannel::new(url)));
            }
            _ => debug!("webhook channel skipped: ${var} is not set"),
        }
    }

    channels
}

/// Dispatch a report through the channel chain, printing to the console
/// when nothing delivered. Always returns the severity's status code.
pub async fn notify(config: &NotifyConfig, title: &str, body: &str, severity: Severity) -> i32 {
    for channel in resolve_channels(config) {
        if channel.attempt(title, body, severity).await {
            return severity.exit_code();
        }
        debug!("channel {} did not deliver, falling through", channel.name());
    }

    print_report(title, body, severity);
    severity.exit_code()
}

/// Terminal fallback and dry-run output: a banner-formatted report on
/// stdout.
pub fn print_report(title: &str, body: &str, severity: Severity) {
    let ruler = "=".repeat(80);
    println!();
    println!("{ruler}");
    println!("{} {title} - {severity}", severity.marker());
    println!("{ruler}");
    println!("{body}");
    println!("{ruler}");
    println!();
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "✓"
    } else {
        "✗"
    }
}

fn pass_fail(ok: bool) -> &'static str {
    if ok {
        "PASS"
    } else {
        "FAIL"
    }
}

fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Flatten a check report and its historical comparison into the textual
/// summary carried by every notification channel.
pub fn format_summary(report: &CheckReport, comparison: &ComparisonResult) -> String {
    let mut lines = Vec::new();

    lines.push(format!("URL: {}", report.url));
    lines.push(format!(
        "{} Status Code: {}",
        mark(report.status_ok),
        report.status
    ));
    lines.push(format!("Size: {} bytes", format_thousands(report.size_bytes)));
    if let Some(checksum) = &report.checksum {
        let prefix: String = checksum.chars().take(16).collect();
        lines.push(format!("Checksum: {prefix}..."));
    }
    if comparison.size_change_pct != 0.0 {
        let arrow = if comparison.size_change_pct < 0.0 {
            "↓"
        } else {
            "↑"
        };
        lines.push(format!(
            "{arrow} Size Change: {:+.1}%",
            comparison.size_change_pct
        ));
    }

    lines.push(String::new());
    lines.push("Check Results:".to_string());
    lines.push(format!(
        "  {} status: {}",
        mark(report.status_ok),
        pass_fail(report.status_ok)
    ));
    lines.push(format!(
        "  {} min_bytes: {}",
        mark(report.min_bytes_ok),
        pass_fail(report.min_bytes_ok)
    ));
    if let Some(ok) = report.content_type_ok {
        lines.push(format!("  {} content_type: {}", mark(ok), pass_fail(ok)));
    }
    if let Some(selectors) = &report.selectors {
        let error = selectors
            .error
            .as_deref()
            .map(|e| format!(" - {e}"))
            .unwrap_or_default();
        lines.push(format!(
            "  {} html_selectors: {}{error}",
            mark(selectors.valid),
            pass_fail(selectors.valid)
        ));
        for (selector, hit) in &selectors.found {
            lines.push(format!("    {} {selector}", mark(*hit)));
        }
    }
    if let Some(schema) = &report.schema {
        let verdict = if schema.skipped {
            "SKIPPED"
        } else {
            pass_fail(schema.valid)
        };
        let error = schema
            .error
            .as_deref()
            .map(|e| format!(" - {e}"))
            .unwrap_or_default();
        lines.push(format!(
            "  {} schema: {verdict}{error}",
            mark(schema.valid || schema.skipped)
        ));
        if !schema.missing_columns.is_empty() {
            lines.push(format!(
                "    missing columns: {}",
                schema.missing_columns.join(", ")
            ));
        }
        if !schema.skipped {
            lines.push(format!("    rows: {}", schema.row_count));
        }
    }

    let mut warnings = Vec::new();
    if comparison.changed {
        warnings.push("⚠️ Content has changed (checksum mismatch)".to_string());
    }
    if comparison.size_dropped_50pct {
        warnings.push("⚠️ Size dropped >50%".to_string());
    }
    if comparison.anomaly {
        warnings.push("⚠️ ANOMALY DETECTED: content changed and size dropped >50%".to_string());
    }
    if !warnings.is_empty() {
        lines.push(String::new());
        lines.extend(warnings);
    }

    lines.join("\n")
}
