// Configuration File Support
//
// This module provides configuration file parsing for the Warden service.
// Supports TOML format with environment variable overrides.
// The configuration is read once at startup and never reloaded; changing
// policy requires a restart.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::deadline::Deadline;
use crate::exec::{RunnerConfig, DEFAULT_SEARCH_PATH};
use crate::guards::{AllowedCommandSpec, AllowedCommandTable, Secret};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// File viewing (path confinement root)
    pub files: FilesConfig,

    /// Command whitelist and execution limits
    pub commands: CommandsConfig,

    /// Host reachability probe
    pub probe: ProbeConfig,

    /// Users database
    pub database: DatabaseConfig,

    /// Request payload limits
    pub payload: PayloadConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// API key for `/run`. Only ever taken from the `API_KEY` environment
    /// variable, never from the file.
    #[serde(skip)]
    pub api_key: Secret,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// File viewing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory `/view` is confined to
    pub upload_dir: PathBuf,

    /// Create the directory at startup if it does not exist
    pub create_if_missing: bool,

    /// Deadline for a single file read in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("/tmp/uploads"),
            create_if_missing: true,
            read_timeout_ms: 2000,
        }
    }
}

/// Command execution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandsConfig {
    /// Deadline for one command in seconds
    pub timeout_secs: u64,

    /// Captured output limit per stream in bytes
    pub max_output_bytes: usize,

    /// `PATH` given to child processes
    pub search_path: String,

    /// Whitelisted programs and their argument vocabulary
    pub allowed: Vec<AllowedCommandSpec>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            max_output_bytes: 64 * 1024,
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            allowed: AllowedCommandTable::default_specs(),
        }
    }
}

/// Host probe configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// TCP port the probe connects to
    pub port: u16,

    /// Deadline for resolve + connect in milliseconds
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: 80,
            timeout_ms: 2000,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file
    pub path: PathBuf,

    /// Deadline for one query in milliseconds
    pub query_timeout_ms: u64,

    /// Create the schema and seed demo users at startup
    pub seed_demo_users: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("app.db"),
            query_timeout_ms: 2000,
            seed_demo_users: true,
        }
    }
}

/// Payload configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PayloadConfig {
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to serve `/metrics`
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            files: FilesConfig::default(),
            commands: CommandsConfig::default(),
            probe: ProbeConfig::default(),
            database: DatabaseConfig::default(),
            payload: PayloadConfig::default(),
            metrics: MetricsConfig::default(),
            api_key: Secret::unset(),
        }
    }
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// the result fails validation. A missing file means defaults; environment
    /// overrides apply either way.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    ///
    /// - API_KEY
    /// - UPLOAD_DIR
    /// - PORT
    /// - WARDEN_BIND
    /// - WARDEN_DB_PATH
    /// - WARDEN_LOG_LEVEL
    /// - WARDEN_LOG_FORMAT
    /// - WARDEN_METRICS_ENABLED
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // An API key set to "" stays unset
        self.api_key = Secret::new(lookup("API_KEY"));

        if let Some(dir) = lookup("UPLOAD_DIR").filter(|d| !d.is_empty()) {
            self.files.upload_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Some(bind) = lookup("WARDEN_BIND").filter(|b| !b.is_empty()) {
            self.server.bind = bind;
        }
        if let Some(path) = lookup("WARDEN_DB_PATH").filter(|p| !p.is_empty()) {
            self.database.path = PathBuf::from(path);
        }

        // Logging overrides
        if let Some(level) = lookup("WARDEN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("WARDEN_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Metrics overrides
        if let Some(enabled) = lookup("WARDEN_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        if self.files.upload_dir.as_os_str().is_empty() {
            anyhow::bail!("Upload directory must not be empty");
        }
        if self.files.read_timeout_ms == 0 {
            anyhow::bail!("File read timeout must be > 0");
        }

        // Validate command policy
        if self.commands.timeout_secs == 0 {
            anyhow::bail!("Command timeout must be > 0");
        }
        if self.commands.max_output_bytes < 16 {
            anyhow::bail!("Command output limit must be at least 16 bytes");
        }
        if self.commands.search_path.is_empty() {
            anyhow::bail!("Command search path must not be empty");
        }
        self.command_table()?;

        if self.probe.port == 0 {
            anyhow::bail!("Probe port must be > 0");
        }
        if self.probe.timeout_ms == 0 {
            anyhow::bail!("Probe timeout must be > 0");
        }

        if self.database.query_timeout_ms == 0 {
            anyhow::bail!("Query timeout must be > 0");
        }

        if self.payload.max_body_bytes == 0 {
            anyhow::bail!("Payload limit must be > 0");
        }

        Ok(())
    }

    /// Build the immutable command whitelist
    pub fn command_table(&self) -> Result<AllowedCommandTable> {
        AllowedCommandTable::new(self.commands.allowed.iter().cloned())
            .context("Invalid command whitelist")
    }

    /// Subprocess limits derived from `[commands]`
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            timeout: Deadline::from_secs(self.commands.timeout_secs),
            max_output_size: self.commands.max_output_bytes,
            search_path: self.commands.search_path.clone(),
            working_dir: None,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.files.read_timeout_ms)
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::AllowedArgs;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.files.upload_dir, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.commands.timeout_secs, 5);
        assert!(!config.api_key.is_set());
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeouts() {
        let mut config = Config::default();
        config.commands.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.probe.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.query_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.files.read_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_whitelist() {
        let mut config = Config::default();
        config
            .commands
            .allowed
            .push(AllowedCommandSpec::new("echo", AllowedArgs::Any));
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("more than once"));
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("nonexistent");
        let config = Config::load_from_path(&path);
        assert!(config.is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_content = r#"
[server]
bind = "127.0.0.1"
port = 8080

[logging]
level = "debug"
format = "json"

[files]
upload_dir = "/srv/uploads"
read_timeout_ms = 500

[commands]
timeout_secs = 3

[[commands.allowed]]
name = "echo"
args = ["hello"]

[[commands.allowed]]
name = "uname"
args = "any"

[probe]
port = 443

[database]
path = "/var/lib/warden/users.db"
seed_demo_users = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        let config = config.apply_overrides(no_env);
        config.validate().unwrap();

        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.files.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.commands.timeout_secs, 3);
        assert_eq!(config.commands.allowed.len(), 2);
        assert_eq!(config.probe.port, 443);
        assert!(!config.database.seed_demo_users);

        let table = config.command_table().unwrap();
        assert!(table.is_allowed("uname"));
        assert!(!table.is_allowed("date"));
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config: Config = toml::from_str(include_str!("../warden.example.toml")).unwrap();
        let config = config.apply_overrides(no_env);
        config.validate().unwrap();

        let defaults = Config::default();
        assert_eq!(config.server, defaults.server);
        assert_eq!(config.commands.allowed, defaults.commands.allowed);
    }

    #[test]
    fn test_api_key_in_file_is_ignored() {
        let config: Config = toml::from_str(
            r#"
api_key = "from-file"
"#,
        )
        .unwrap();
        let config = config.apply_overrides(no_env);
        assert!(!config.api_key.is_set());
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging
level = "debug"
"#; // Invalid TOML

        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path());
        assert!(config.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().apply_overrides(env_from(&[
            ("API_KEY", "k-123"),
            ("UPLOAD_DIR", "/data/uploads"),
            ("PORT", "9000"),
            ("WARDEN_BIND", "127.0.0.1"),
            ("WARDEN_DB_PATH", "/tmp/users.db"),
            ("WARDEN_LOG_LEVEL", "debug"),
            ("WARDEN_LOG_FORMAT", "json"),
            ("WARDEN_METRICS_ENABLED", "false"),
        ]));

        assert!(config.api_key.is_set());
        assert!(config.api_key.verify("k-123"));
        assert_eq!(config.files.upload_dir, PathBuf::from("/data/uploads"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.database.path, PathBuf::from("/tmp/users.db"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_env_overrides_invalid_values() {
        let config = Config::default().apply_overrides(env_from(&[
            ("API_KEY", ""),
            ("PORT", "not-a-port"),
            ("UPLOAD_DIR", ""),
            ("WARDEN_METRICS_ENABLED", "maybe"),
        ]));

        // Invalid values keep defaults
        assert!(!config.api_key.is_set());
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.files.upload_dir, PathBuf::from("/tmp/uploads"));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_debug_does_not_print_api_key() {
        let config =
            Config::default().apply_overrides(env_from(&[("API_KEY", "very-secret-value")]));
        assert!(!format!("{:?}", config).contains("very-secret-value"));
    }

    #[test]
    fn test_runner_config() {
        let mut config = Config::default();
        config.commands.timeout_secs = 7;
        config.commands.max_output_bytes = 128;
        let runner = config.runner_config();
        assert_eq!(runner.timeout.duration(), Duration::from_secs(7));
        assert_eq!(runner.max_output_size, 128);
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);

        config.logging.level = "invalid".to_string();
        assert!(config.log_level().is_err());
    }

    #[test]
    fn test_valid_log_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let mut config = Config::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "Log level {} should be valid", level);
        }
    }
}
