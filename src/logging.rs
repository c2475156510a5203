//! Structured logging setup
//!
//! `RUST_LOG` takes precedence; otherwise the configured level (or debug when
//! `--verbose` is given) applies.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("Invalid log format: {}", other),
        }
    }
}

/// Pick the default level from config and the verbose flag
pub fn default_level(config: &LoggingConfig, verbose: bool) -> Result<Level> {
    if verbose {
        return Ok(Level::DEBUG);
    }
    config
        .level
        .to_lowercase()
        .parse()
        .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = default_level(config, verbose)?;
    let format = LogFormat::parse(&config.format)?;
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(level));

    let installed = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::fmt;

    #[test]
    fn test_format_parsing() {
        assert_eq!(LogFormat::parse("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::parse("Pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("compact").unwrap(), LogFormat::Compact);
        assert!(LogFormat::parse("xml").is_err());
    }

    #[test]
    fn test_default_level() {
        let config = LoggingConfig::default();
        assert_eq!(default_level(&config, false).unwrap(), Level::INFO);
        assert_eq!(default_level(&config, true).unwrap(), Level::DEBUG);

        let config = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        assert_eq!(default_level(&config, false).unwrap(), Level::WARN);

        let config = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(default_level(&config, false).is_err());
    }

    #[test]
    fn test_json_subscriber_builds() {
        let subscriber = fmt()
            .json()
            .with_env_filter(env_filter(Level::INFO))
            .with_test_writer()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(guard = "hostname", code = "invalid_host", "Guard rejected request");
        });
    }
}
