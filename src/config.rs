//! Configuration module for sgsync
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/sgsync/sgsync.toml)
//! - User configuration (~/.sgsync.toml)
//! - Project configuration (./sgsync.toml)
//! - Environment variables
//! - Command-line arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::modules::securitygroup::PollSettings;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default settings
    pub defaults: Defaults,

    /// AWS connection settings
    pub aws: AwsConfig,

    /// Convergence behavior
    pub convergence: ConvergenceConfig,

    /// Colors and output settings
    pub colors: ColorsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            aws: AwsConfig::default(),
            convergence: ConvergenceConfig::default(),
            colors: ColorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Default output format: human, json, yaml, minimal
    pub output_format: String,

    /// Show diffs by default
    pub diff: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output_format: "human".to_string(),
            diff: false,
        }
    }
}

/// AWS connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// Region to operate in; the SDK's own resolution applies when unset
    pub region: Option<String>,

    /// Shared-config profile name
    pub profile: Option<String>,
}

/// Convergence behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Delay between polls while waiting for a created group to appear
    #[serde(with = "humantime_serde")]
    pub creation_poll_interval: Duration,

    /// How many polls before giving up on a created group
    pub creation_poll_attempts: u32,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            creation_poll_interval: Duration::from_secs(1),
            creation_poll_attempts: 10,
        }
    }
}

/// Colors configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    /// Enable colors
    pub enabled: bool,

    /// OK color
    pub ok: String,

    /// Changed color
    pub changed: String,

    /// Error color
    pub error: String,

    /// Warning color
    pub warn: String,

    /// Skipped color
    pub skipped: String,

    /// Diff add color
    pub diff_add: String,

    /// Diff remove color
    pub diff_remove: String,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ok: "green".to_string(),
            changed: "yellow".to_string(),
            error: "red".to_string(),
            warn: "bright_purple".to_string(),
            skipped: "cyan".to_string(),
            diff_add: "green".to_string(),
            diff_remove: "red".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log path
    pub log_path: Option<PathBuf>,

    /// Log level
    pub log_level: String,

    /// Log timestamp
    pub log_timestamp: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            log_level: "info".to_string(),
            log_timestamp: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        // Load from standard locations
        let config_paths = Self::get_config_paths(config_path);

        for path in config_paths {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        // Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Explicit path takes priority
        if let Some(path) = explicit_path {
            paths.push(path.clone());
            return paths;
        }

        // System-wide config
        paths.push(PathBuf::from("/etc/sgsync/sgsync.toml"));

        // User config
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".sgsync.toml"));
            paths.push(home.join(".sgsync/sgsync.toml"));
            paths.push(home.join(".sgsync/config"));
        }

        // Project config (current directory)
        paths.push(PathBuf::from("sgsync.toml"));
        paths.push(PathBuf::from(".sgsync.toml"));

        // Environment variable
        if let Ok(env_config) = std::env::var("SGSYNC_CONFIG") {
            paths.insert(0, PathBuf::from(env_config));
        }

        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        // Determine format based on extension
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => {
                // Try TOML first, then YAML
                toml::from_str(&content)
                    .or_else(|_| serde_yaml::from_str(&content))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
        };

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one
    fn merge(&self, other: Config) -> Config {
        // For simplicity, other takes precedence for non-default values
        Config {
            defaults: Defaults {
                output_format: if other.defaults.output_format != "human" {
                    other.defaults.output_format
                } else {
                    self.defaults.output_format.clone()
                },
                diff: other.defaults.diff || self.defaults.diff,
            },
            aws: AwsConfig {
                region: other.aws.region.or_else(|| self.aws.region.clone()),
                profile: other.aws.profile.or_else(|| self.aws.profile.clone()),
            },
            convergence: ConvergenceConfig {
                creation_poll_interval: if other.convergence.creation_poll_interval
                    != Duration::from_secs(1)
                {
                    other.convergence.creation_poll_interval
                } else {
                    self.convergence.creation_poll_interval
                },
                creation_poll_attempts: if other.convergence.creation_poll_attempts != 10 {
                    other.convergence.creation_poll_attempts
                } else {
                    self.convergence.creation_poll_attempts
                },
            },
            colors: other.colors,
            logging: LoggingConfig {
                log_path: other
                    .logging
                    .log_path
                    .or_else(|| self.logging.log_path.clone()),
                log_level: if other.logging.log_level != "info" {
                    other.logging.log_level
                } else {
                    self.logging.log_level.clone()
                },
                log_timestamp: other.logging.log_timestamp,
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // SGSYNC_REGION
        if let Ok(region) = std::env::var("SGSYNC_REGION") {
            self.aws.region = Some(region);
        }

        // SGSYNC_PROFILE
        if let Ok(profile) = std::env::var("SGSYNC_PROFILE") {
            self.aws.profile = Some(profile);
        }

        // SGSYNC_POLL_ATTEMPTS
        if let Ok(attempts) = std::env::var("SGSYNC_POLL_ATTEMPTS") {
            if let Ok(n) = attempts.parse() {
                self.convergence.creation_poll_attempts = n;
            }
        }

        // SGSYNC_OUTPUT
        if let Ok(format) = std::env::var("SGSYNC_OUTPUT") {
            self.defaults.output_format = format;
        }

        // NO_COLOR
        if std::env::var("NO_COLOR").is_ok() || std::env::var("SGSYNC_NO_COLOR").is_ok() {
            self.colors.enabled = false;
        }

        // SGSYNC_LOG_PATH
        if let Ok(path) = std::env::var("SGSYNC_LOG_PATH") {
            self.logging.log_path = Some(PathBuf::from(path));
        }

        // SGSYNC_LOG_LEVEL
        if let Ok(level) = std::env::var("SGSYNC_LOG_LEVEL") {
            self.logging.log_level = level;
        }
    }

    /// Get the effective AWS region
    pub fn region(&self) -> Option<&str> {
        self.aws.region.as_deref()
    }

    /// Get the effective AWS profile
    pub fn profile(&self) -> Option<&str> {
        self.aws.profile.as_deref()
    }

    /// Creation polling translated into engine terms
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            attempts: self.convergence.creation_poll_attempts,
            interval: self.convergence.creation_poll_interval,
        }
    }

    /// Load from a specific file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        Config::default().merge_from_file(&path_buf)
    }
}
