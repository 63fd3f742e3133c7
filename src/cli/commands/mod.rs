//! Subcommands module for the sgsync CLI
//!
//! This module contains all the subcommand implementations.

pub mod apply;
pub mod modules;
pub mod validate;

use crate::cli::output::OutputFormatter;
use crate::cli::OutputFormat;
use sgsync::config::Config;
use sgsync::error::{Error, Result};
use sgsync::modules::securitygroup::SecurityGroupModule;
use sgsync::modules::{ModuleContext, ModuleParams, ModuleRegistry};
use std::path::Path;
use std::sync::Arc;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Extra module parameters from -e flags
    pub extra_params: Vec<String>,
    /// Verbosity level
    pub verbosity: u8,
    /// Check mode (dry-run)
    pub check_mode: bool,
    /// Diff mode
    pub diff_mode: bool,
    /// AWS region override
    pub region: Option<String>,
    /// AWS profile override
    pub profile: Option<String>,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: Config) -> Self {
        let format = cli
            .output
            .unwrap_or_else(|| OutputFormat::from_config(&config.defaults.output_format));
        let use_color = !cli.no_color && config.colors.enabled;
        let output = OutputFormatter::new(use_color, format, cli.verbosity(), &config.colors);

        let region = cli
            .region
            .clone()
            .or_else(|| config.region().map(String::from));
        let profile = cli
            .profile
            .clone()
            .or_else(|| config.profile().map(String::from));

        Self {
            output,
            extra_params: cli.extra_params.clone(),
            verbosity: cli.verbosity(),
            check_mode: cli.check_mode,
            diff_mode: cli.diff_mode || config.defaults.diff,
            region,
            profile,
            config,
        }
    }

    /// Build the module registry with the configured convergence settings
    pub fn registry(&self) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(
            SecurityGroupModule::new().with_poll(self.config.poll_settings()),
        ));
        registry
    }

    /// Module execution context derived from the CLI flags
    pub fn module_context(&self) -> ModuleContext {
        ModuleContext::new()
            .with_check_mode(self.check_mode)
            .with_diff_mode(self.diff_mode)
            .with_verbosity(self.verbosity)
    }

    /// Fill in connection parameters the definition file leaves out
    pub fn inject_connection_params(&self, params: &mut ModuleParams) {
        if let Some(region) = &self.region {
            params
                .entry("region".to_string())
                .or_insert_with(|| serde_json::Value::String(region.clone()));
        }
        if let Some(profile) = &self.profile {
            params
                .entry("profile".to_string())
                .or_insert_with(|| serde_json::Value::String(profile.clone()));
        }
    }

    /// Parse extra parameters into module parameters
    pub fn parse_extra_params(&self) -> Result<ModuleParams> {
        let mut params = ModuleParams::new();

        for var in &self.extra_params {
            if let Some(file_path) = var.strip_prefix('@') {
                // Load from file
                let content = std::fs::read_to_string(file_path)
                    .map_err(|e| Error::params_load(file_path, e.to_string()))?;
                let file_params: ModuleParams = serde_yaml::from_str(&content)
                    .map_err(|e| Error::params_load(file_path, e.to_string()))?;
                params.extend(file_params);
            } else if let Some((key, value)) = var.split_once('=') {
                // Parse key=value with YAML scalar coercion
                let parsed: serde_json::Value = serde_yaml::from_str(value)
                    .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
                params.insert(key.to_string(), parsed);
            } else {
                return Err(Error::InvalidExtraVar(var.clone()));
            }
        }

        Ok(params)
    }
}

/// Load module parameters from a YAML or JSON definition file
pub fn load_params(path: &Path) -> Result<ModuleParams> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let content =
        std::fs::read_to_string(path).map_err(|e| Error::params_load(path, e.to_string()))?;

    let value: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            serde_json::from_str(&content).map_err(|e| Error::params_load(path, e.to_string()))?
        }
        _ => serde_yaml::from_str(&content).map_err(|e| Error::params_load(path, e.to_string()))?,
    };

    match value {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(Error::params_load(
            path,
            "expected a mapping of module parameters",
        )),
    }
}
