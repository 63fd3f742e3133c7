//! CLI module for sgsync
//!
//! This module provides the command-line interface for sgsync,
//! including argument parsing, configuration loading, and subcommand handling.

pub mod commands;
pub mod completions;
pub mod diff;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// sgsync - Declarative security group management for AWS EC2
///
/// Converges EC2 security groups to the state declared in a definition file.
#[derive(Parser, Debug, Clone)]
#[command(name = "sgsync")]
#[command(author)]
#[command(version)]
#[command(about = "Declarative security group management for AWS EC2", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Extra module parameters (key=value or @file.yml)
    #[arg(short = 'e', long = "extra-param", global = true, action = clap::ArgAction::Append)]
    pub extra_params: Vec<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run in check mode (dry-run, don't make changes)
    #[arg(long = "check", global = true)]
    pub check_mode: bool,

    /// Show a diff of the remote state before and after convergence
    #[arg(long = "diff", global = true)]
    pub diff_mode: bool,

    /// Output format (defaults to the configured format)
    #[arg(long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// AWS region to operate in
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// AWS shared-config profile to use
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "SGSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    Human,
    /// JSON output for scripting
    Json,
    /// YAML output
    Yaml,
    /// Minimal output (only errors)
    Minimal,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Human
    }
}

impl OutputFormat {
    /// Resolve a format name from the configuration file
    pub fn from_config(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "json" => Self::Json,
            "yaml" => Self::Yaml,
            "minimal" => Self::Minimal,
            _ => Self::Human,
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Converge a security group to its declared state
    Apply(commands::apply::ApplyArgs),

    /// Validate a definition file without contacting AWS
    Validate(commands::validate::ValidateArgs),

    /// List the available modules
    Modules(commands::modules::ModulesArgs),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

/// Arguments for the completions command
#[derive(Parser, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
