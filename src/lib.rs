//! # sgsync - Declarative Security Group Management
//!
//! sgsync converges AWS EC2 security groups to a declared state. A definition
//! describes the group and its rules; sgsync describes what actually exists,
//! diffs the two by canonical rule identity, and applies only the operations
//! needed to close the gap.
//!
//! ## Core Concepts
//!
//! - **Definitions**: YAML/JSON documents declaring a group, its rules, and tags
//! - **Modules**: Units of work that converge one resource kind (see [`modules`])
//! - **Expansion**: Multi-port and multi-source rule entries fan out into
//!   single-grant rules before comparison
//! - **Rule keys**: Canonical identity strings that make remote and desired
//!   rules comparable regardless of how the API reports them
//! - **Check mode**: Computes the full change set without mutating anything
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      CLI Interface                        │
//! │               (clap-based command parsing)                │
//! └───────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                    Module Registry                        │
//! │          (parameter validation and dispatch)              │
//! └───────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                 Reconciliation Engine                     │
//! │   (describe, expand, resolve, diff by key, apply)         │
//! └───────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                  SecurityGroupApi Trait                   │
//! │        (AWS SDK client, or a test double in tests)        │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use sgsync::modules::{ModuleContext, ModuleRegistry};
//!
//! let registry = ModuleRegistry::with_builtins();
//! let context = ModuleContext::new().with_check_mode(true);
//! let output = registry.execute("securitygroup", &params, &context)?;
//! println!("changed: {}", output.changed);
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorContext, Result};
    pub use crate::modules::securitygroup::{
        Direction, GroupRecord, GroupReport, GroupState, PollSettings, ReconcileOutcome,
        ReconcileRequest, ReconciliationEngine, RuleSpec, SecurityGroupApi, SecurityGroupModule,
        WirePermission,
    };
    pub use crate::modules::{
        Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleRegistry,
        ModuleResult, ModuleStatus, ParamExt,
    };
}

// ============================================================================
// Error Handling
// ============================================================================

/// Error types used throughout sgsync.
pub mod error;

// ============================================================================
// Modules
// ============================================================================

/// Module system: the execution framework and the built-in modules.
///
/// Modules are the units of work. Each one validates its parameters,
/// converges a resource kind, and reports what changed.
pub mod modules;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration management for sgsync behavior.
///
/// Handles loading and merging configuration from multiple sources:
/// environment variables, config files, and command-line arguments.
pub mod config;

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of sgsync.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
