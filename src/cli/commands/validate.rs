//! Validate command - check a definition file without contacting AWS

use super::{load_params, CommandContext};
use clap::Parser;
use sgsync::error::{Error, Result};
use std::path::PathBuf;

/// Arguments for the validate command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// Path to the definition file (YAML or JSON)
    #[arg(required = true)]
    pub definition: PathBuf,

    /// Module to validate against
    #[arg(short = 'm', long, default_value = "securitygroup")]
    pub module: String,
}

impl ValidateArgs {
    /// Execute the validate command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let mut params = load_params(&self.definition)?;
        params.extend(ctx.parse_extra_params()?);
        ctx.inject_connection_params(&mut params);

        let registry = ctx.registry();
        let module = registry
            .get(&self.module)
            .ok_or_else(|| Error::ModuleNotFound(self.module.clone()))?;

        for required in module.required_params() {
            if !params.contains_key(*required) {
                return Err(Error::module_args(
                    &self.module,
                    format!("missing required parameter '{}'", required),
                ));
            }
        }

        module
            .validate_params(&params)
            .map_err(|e| Error::module_args(&self.module, e.to_string()))?;

        if ctx.output.is_json() {
            println!(
                "{}",
                serde_json::json!({
                    "valid": true,
                    "module": self.module,
                    "file": self.definition,
                })
            );
        } else {
            ctx.output.plain(&format!(
                "{}: parameters are valid for module '{}'",
                self.definition.display(),
                self.module
            ));
        }

        Ok(0)
    }
}
