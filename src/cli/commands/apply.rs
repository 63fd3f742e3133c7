//! Apply command - converge a security group to its declared state
//!
//! Loads a definition file, merges extra parameters, and hands the result
//! to the module registry for execution.

use super::{load_params, CommandContext};
use clap::Parser;
use sgsync::error::{Error, Result};
use sgsync::modules::{ModuleStatus, ParamExt};
use std::path::PathBuf;

/// Arguments for the apply command
#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// Path to the definition file (YAML or JSON)
    #[arg(required = true)]
    pub definition: PathBuf,

    /// Module to execute
    #[arg(short = 'm', long, default_value = "securitygroup")]
    pub module: String,
}

impl ApplyArgs {
    /// Execute the apply command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let mut params = load_params(&self.definition)?;
        params.extend(ctx.parse_extra_params()?);
        ctx.inject_connection_params(&mut params);

        let target = params
            .get_string("name")
            .ok()
            .flatten()
            .unwrap_or_else(|| self.definition.display().to_string());

        ctx.output.banner(&format!("APPLY: {}", target));
        if ctx.check_mode {
            ctx.output
                .warning("Running in CHECK MODE - no changes will be made");
        }
        ctx.output
            .debug(&format!("Module parameters: {:?}", params));

        let registry = ctx.registry();
        let context = ctx.module_context();

        let spinner = ctx
            .output
            .create_spinner(&format!("Converging '{}'...", target));
        let result = registry.execute(&self.module, &params, &context);
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        let output =
            result.map_err(|e| Error::module_execution(&self.module, e.to_string()))?;

        ctx.output.module_result(&target, &output);
        ctx.output.finished();

        if output.status == ModuleStatus::Failed {
            Ok(2)
        } else {
            Ok(0)
        }
    }
}
