//! Subscriber setup and the redaction helpers used wherever wallet data is
//! logged. PINs and PIN hashes are never passed to any of these.

use crate::config::ApplicationSettings;
use crate::error::{AppError, Result};
use rust_decimal::Decimal;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};
use uuid::Uuid;

/// sqlx logs every statement at info; ledger writes would drown everything else.
const QUIET_DEPENDENCIES: &str = "sqlx::query=warn";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Adds file and line to every event.
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            source_location: false,
        }
    }
}

impl LogConfig {
    /// Filter directives used when `RUST_LOG` is not set.
    pub fn directives(&self) -> String {
        format!("{},{}", self.level, QUIET_DEPENDENCIES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One object per event; span close events carry workflow timings.
    Json,
    Compact,
}

impl From<&str> for LogFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

impl From<&ApplicationSettings> for LogConfig {
    fn from(settings: &ApplicationSettings) -> Self {
        Self {
            level: settings.log_level.clone(),
            format: LogFormat::from(settings.log_format.as_str()),
            source_location: settings.log_source_location,
        }
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let base = fmt::layer()
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location);
    let fmt_layer = match config.format {
        LogFormat::Json => base.json().with_span_events(FmtSpan::CLOSE).boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to install log subscriber: {}", e)))?;

    tracing::info!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

/// Keeps the category prefix and the random suffix of a ledger reference,
/// hiding the timestamp: `BBPS202610170905031234` becomes `BBPS**************1234`.
pub fn mask_reference(reference: &str) -> String {
    let prefix_len = reference.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let suffix_len = 4;
    if reference.len() <= prefix_len + suffix_len {
        return reference.to_string();
    }
    let hidden = reference.len() - prefix_len - suffix_len;
    format!(
        "{}{}{}",
        &reference[..prefix_len],
        "*".repeat(hidden),
        &reference[reference.len() - suffix_len..]
    )
}

/// Beneficiary account number with only the last four digits visible.
pub fn mask_account(account: &str) -> String {
    let visible = 4;
    let len = account.chars().count();
    if len <= visible {
        return "*".repeat(len);
    }
    let tail: String = account.chars().skip(len - visible).collect();
    format!("{}{}", "*".repeat(len - visible), tail)
}

/// First group of a wallet id; enough to correlate log lines.
pub fn mask_wallet_id(wallet_id: &Uuid) -> String {
    let id = wallet_id.to_string();
    format!("{}-****", &id[..8])
}

/// Coarse size class of a transaction amount.
pub fn amount_band(amount: &Decimal) -> &'static str {
    let abs = amount.abs();
    if abs < Decimal::from(100) {
        "<100"
    } else if abs < Decimal::from(1_000) {
        "100-999"
    } else if abs < Decimal::from(10_000) {
        "1K-9.9K"
    } else if abs < Decimal::from(100_000) {
        "10K-99K"
    } else {
        "100K+"
    }
}
