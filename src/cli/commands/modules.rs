//! Modules command - list the available modules

use super::CommandContext;
use clap::Parser;
use sgsync::error::{Error, Result};

/// Arguments for the modules command
#[derive(Parser, Debug, Clone)]
pub struct ModulesArgs {
    /// Show details for a single module
    pub module: Option<String>,
}

impl ModulesArgs {
    /// Execute the modules command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let registry = ctx.registry();

        if let Some(name) = &self.module {
            let module = registry
                .get(name)
                .ok_or_else(|| Error::ModuleNotFound(name.clone()))?;

            if ctx.output.is_json() {
                println!(
                    "{}",
                    serde_json::json!({
                        "name": module.name(),
                        "description": module.description(),
                        "required_params": module.required_params(),
                    })
                );
                return Ok(0);
            }

            ctx.output.section(module.name());
            ctx.output.plain(module.description());
            if !module.required_params().is_empty() {
                ctx.output.plain(&format!(
                    "required parameters: {}",
                    module.required_params().join(", ")
                ));
            }
            return Ok(0);
        }

        let mut names: Vec<String> = registry.names().into_iter().map(String::from).collect();
        names.sort();

        let mut items = Vec::new();
        for name in &names {
            if let Some(module) = registry.get(name) {
                items.push(format!("{} - {}", name, module.description()));
            }
        }

        ctx.output.list("Available modules", &items);
        Ok(0)
    }
}
