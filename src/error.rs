//! Error types for sgsync.
//!
//! This module defines the error types used throughout sgsync, providing
//! rich error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sgsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for sgsync.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Module Errors
    // ========================================================================
    /// Module not found.
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    /// Invalid module arguments.
    #[error("Invalid arguments for module '{module}': {message}")]
    ModuleArgs {
        /// Module name
        module: String,
        /// Error message
        message: String,
    },

    /// Module execution failed.
    #[error("Module '{module}' execution failed: {message}")]
    ModuleExecution {
        /// Module name
        module: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Parameter File Errors
    // ========================================================================
    /// Error loading a module parameter file.
    #[error("Failed to load parameters from '{path}': {message}")]
    ParamsLoad {
        /// Path to the parameter file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Invalid extra variable definition.
    #[error("Invalid extra variable '{0}', expected key=value")]
    InvalidExtraVar(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new module args error.
    pub fn module_args(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModuleArgs {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Creates a new module execution error.
    pub fn module_execution(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModuleExecution {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Creates a new parameter file error.
    pub fn params_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ParamsLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid configuration value error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ModuleExecution { .. } | Error::ModuleNotFound(_) | Error::ModuleArgs { .. } => {
                2
            }
            Error::Config(_) | Error::InvalidConfig { .. } => 3,
            Error::ParamsLoad { .. }
            | Error::InvalidExtraVar(_)
            | Error::YamlParse(_)
            | Error::JsonParse(_)
            | Error::TomlParse(_) => 4,
            Error::FileNotFound(_) | Error::Io(_) => 5,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}
