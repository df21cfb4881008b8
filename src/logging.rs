//! Structured logging setup for the CLI.
//!
//! Events go to stderr so command output on stdout stays machine-readable.
//! The filter comes from `MIR_LOG` (falling back to the configured level),
//! the format from `MIR_LOG_FORMAT` or the CLI flag.

use std::str::FromStr;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::MirError;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "MIR_LOG";

/// Log line format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = MirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(MirError::InvalidArgs(format!(
                "unknown log format '{other}' (expected text or json)"
            ))),
        }
    }
}

/// Installs the global subscriber. Calling it twice is a no-op.
pub fn init_logging(default_level: &str, format: LogFormat) -> Result<(), MirError> {
    let filter = build_env_filter(default_level)?;
    let base = Registry::default().with(filter);

    let result = match format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    // Already installed (tests, embedding applications).
    let _ = result;
    Ok(())
}

fn build_env_filter(default_level: &str) -> Result<EnvFilter, MirError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    EnvFilter::try_new(default_level)
        .map_err(|e| MirError::InvalidArgs(format!("invalid log level '{default_level}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().expect("parse"), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_bad_level_rejected() {
        if std::env::var(LOG_ENV).is_err() {
            assert!(build_env_filter("mirvcs=loud").is_err());
        }
    }
}
