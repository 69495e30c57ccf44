//! Configuration management for lspr
//!
//! Configuration is layered with figment, highest priority first:
//! 1. Environment variables (`LSPR__*`, `__` separates nested keys)
//! 2. An explicit config file, or `lspr.toml` / `.lspr/config.toml`
//! 3. Built-in defaults

pub mod logging;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use lspr_foundation::{LsprError, LsprResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config files probed when no explicit path is given
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["lspr.toml", ".lspr/config.toml"];

/// Prefix for environment overrides
const ENV_PREFIX: &str = "LSPR__";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Language server session settings
    #[serde(default)]
    pub lsp: LspSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Timeouts and launch overrides for language server sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LspSettings {
    /// Deadline for every request sent to a language server
    pub request_timeout_ms: u64,
    /// Deadline for the `initialize` handshake
    pub init_timeout_ms: u64,
    /// How long to watch a fresh process for an immediate exit
    pub spawn_grace_ms: u64,
    /// Deadline for the `shutdown` request during cleanup
    pub shutdown_timeout_ms: u64,
    /// How long to wait for the process to exit after `exit`
    pub exit_grace_ms: u64,
    /// How long to wait for a killed process to be reaped
    pub kill_timeout_ms: u64,
    /// Replacements for entries of the built-in launch table
    pub servers: Vec<ServerOverride>,
}

/// Replaces the command used for one (language, variant) launch table entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerOverride {
    /// Language identifier, e.g. `python`
    pub language: String,
    /// Server variant tag, e.g. `lint`; `None` means the default server
    #[serde(default)]
    pub variant: Option<String>,
    /// Executable followed by its arguments
    pub command: Vec<String>,
}

/// Log output format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format for development
    #[default]
    Pretty,
    /// Structured JSON format for production
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LspSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 60_000,
            init_timeout_ms: 60_000,
            spawn_grace_ms: 100,
            shutdown_timeout_ms: 2_000,
            exit_grace_ms: 500,
            kill_timeout_ms: 5_000,
            servers: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LspSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn spawn_grace(&self) -> Duration {
        Duration::from_millis(self.spawn_grace_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from the default file locations and the environment
    pub fn load() -> LsprResult<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading `path` instead of the default locations
    /// when given. A missing explicit file is an error; missing default files
    /// are not.
    pub fn load_from(path: Option<&Path>) -> LsprResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(LsprError::config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }
                tracing::info!(path = %path.display(), "Loading TOML configuration");
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(found) = Self::find_default_file() {
                    tracing::info!(path = %found.display(), "Loading TOML configuration");
                    figment = figment.merge(Toml::file(found));
                }
            }
        }

        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: AppConfig = figment
            .extract()
            .map_err(|e| LsprError::config(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;

        tracing::debug!(
            request_timeout_ms = config.lsp.request_timeout_ms,
            server_overrides = config.lsp.servers.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn find_default_file() -> Option<PathBuf> {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
    }

    /// Validate the configuration
    pub fn validate(&self) -> LsprResult<()> {
        let lsp = &self.lsp;
        for (name, value) in [
            ("request_timeout_ms", lsp.request_timeout_ms),
            ("init_timeout_ms", lsp.init_timeout_ms),
            ("shutdown_timeout_ms", lsp.shutdown_timeout_ms),
            ("kill_timeout_ms", lsp.kill_timeout_ms),
        ] {
            if value == 0 {
                return Err(LsprError::config(format!("lsp.{} cannot be 0", name)));
            }
        }

        for server in &lsp.servers {
            if server.language.trim().is_empty() {
                return Err(LsprError::config(
                    "LSP server override must name a language",
                ));
            }
            if server.command.is_empty() || server.command[0].trim().is_empty() {
                return Err(LsprError::config(format!(
                    "LSP server command for '{}' cannot be empty",
                    server.language
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(LsprError::config(format!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let mut config = AppConfig::default();
        config.lsp.request_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_ms"));
    }

    #[test]
    fn test_empty_override_command_rejected() {
        let mut config = AppConfig::default();
        config.lsp.servers.push(ServerOverride {
            language: "rust".to_string(),
            variant: None,
            command: vec![],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations_follow_millis() {
        let settings = LspSettings::default();
        assert_eq!(settings.spawn_grace(), Duration::from_millis(100));
        assert_eq!(settings.request_timeout(), Duration::from_secs(60));
    }
}
