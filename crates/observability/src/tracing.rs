//! Tracing/logging initialization.
//!
//! `BAKEOPS_LOG` (falling back to `RUST_LOG`) selects the filter and
//! `BAKEOPS_LOG_FORMAT` picks `json` or `pretty` output.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = ObservabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(ObservabilityError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    #[error("subscriber setup failed: {0}")]
    Setup(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directives, e.g. `info,bakeops_infra=debug`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("BAKEOPS_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        // An unrecognized format falls back to JSON rather than failing startup.
        let format = lookup("BAKEOPS_LOG_FORMAT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        Self { filter, format }
    }

    fn env_filter(&self) -> Result<EnvFilter, ObservabilityError> {
        Ok(EnvFilter::try_new(&self.filter)
            .with_context(|| format!("invalid log filter `{}`", self.filter))?)
    }
}

/// Install the global subscriber described by `config`.
///
/// Returns an error for an invalid filter; a subscriber that is already set is
/// left in place.
pub fn init(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = match config.format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    Ok(())
}

/// [`init`], retrying with the default filter when `config.filter` is invalid.
///
/// The original error is still returned so the host can report it.
pub fn init_with_fallback(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    match init(config) {
        Err(ObservabilityError::Setup(err)) => {
            let fallback = ObservabilityConfig {
                filter: DEFAULT_FILTER.to_string(),
                format: config.format,
            };
            init(&fallback)?;
            Err(ObservabilityError::Setup(err))
        }
        other => other,
    }
}
