//! Output formatting module for sgsync
//!
//! Renders module results, diffs, and diagnostics in human-readable,
//! JSON, YAML, and minimal formats.

use colored::{Color, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use is_terminal::IsTerminal;
use sgsync::config::ColorsConfig;
use sgsync::modules::{ModuleOutput, ModuleStatus};
use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::cli::diff::{ColorizedDiff, DiffOptions};
use crate::cli::OutputFormat;

/// Status colors resolved from the configuration
struct Palette {
    ok: Color,
    changed: Color,
    error: Color,
    warn: Color,
    skipped: Color,
    diff_add: Color,
    diff_remove: Color,
}

impl Palette {
    fn from_config(colors: &ColorsConfig) -> Self {
        Self {
            ok: parse_color(&colors.ok),
            changed: parse_color(&colors.changed),
            error: parse_color(&colors.error),
            warn: parse_color(&colors.warn),
            skipped: parse_color(&colors.skipped),
            diff_add: parse_color(&colors.diff_add),
            diff_remove: parse_color(&colors.diff_remove),
        }
    }
}

/// Map a configured color name onto a terminal color
fn parse_color(name: &str) -> Color {
    name.replace('_', " ")
        .replace("purple", "magenta")
        .parse()
        .unwrap_or(Color::White)
}

/// Output formatter for the different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// Selected output format
    format: OutputFormat,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration reporting
    start_time: Instant,
    /// Configured status colors
    palette: Palette,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, format: OutputFormat, verbosity: u8, colors: &ColorsConfig) -> Self {
        // Respect NO_COLOR and never color output that is being piped
        let use_color =
            use_color && std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

        Self {
            use_color,
            format,
            verbosity,
            start_time: Instant::now(),
            palette: Palette::from_config(colors),
        }
    }

    /// Check if JSON output is selected
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    fn is_machine(&self) -> bool {
        matches!(self.format, OutputFormat::Json | OutputFormat::Yaml)
    }

    fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Minimal)
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.is_machine() || self.is_quiet() {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("\n{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}\n", line.bright_blue());
        } else {
            println!("\n{}", line);
            println!("  {}  ", title);
            println!("{}\n", line);
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.is_machine() || self.is_quiet() {
            return;
        }

        if self.use_color {
            println!("\n{}", title.cyan().bold());
            println!("{}", "-".repeat(title.len()).cyan());
        } else {
            println!("\n{}", title);
            println!("{}", "-".repeat(title.len()));
        }
    }

    /// Print a module result in the selected format
    pub fn module_result(&self, target: &str, output: &ModuleOutput) {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&self.result_doc(target, output)).unwrap());
                return;
            }
            OutputFormat::Yaml => {
                print!("{}", serde_yaml::to_string(&self.result_doc(target, output)).unwrap());
                return;
            }
            OutputFormat::Minimal => {
                if output.status == ModuleStatus::Failed {
                    eprintln!("failed: [{}] => {}", target, output.msg);
                }
                return;
            }
            OutputFormat::Human => {}
        }

        for warning in &output.warnings {
            self.warning(warning);
        }

        let target_str = if self.use_color {
            target.bright_white().bold().to_string()
        } else {
            target.to_string()
        };

        println!(
            "{}: [{}] => {}",
            self.status_string(output.status),
            target_str,
            output.msg
        );

        if let Some(diff) = &output.diff {
            self.render_diff(&diff.before, &diff.after);
        }

        if self.verbosity >= 1 && !output.data.is_empty() {
            let mut keys: Vec<&String> = output.data.keys().collect();
            keys.sort();
            for key in keys {
                let value = &output.data[key];
                if self.use_color {
                    println!("    {}: {}", key.bright_black(), value);
                } else {
                    println!("    {}: {}", key, value);
                }
            }
        }
    }

    /// Build the machine-readable result document
    fn result_doc(&self, target: &str, output: &ModuleOutput) -> serde_json::Value {
        let mut doc = serde_json::to_value(output).unwrap();
        if let Some(map) = doc.as_object_mut() {
            map.insert(
                "name".to_string(),
                serde_json::Value::String(target.to_string()),
            );
        }
        doc
    }

    fn status_string(&self, status: ModuleStatus) -> String {
        if !self.use_color {
            return status.to_string();
        }

        let color = match status {
            ModuleStatus::Ok => self.palette.ok,
            ModuleStatus::Changed => self.palette.changed,
            ModuleStatus::Failed => self.palette.error,
            ModuleStatus::Skipped => self.palette.skipped,
        };

        let colored = status.to_string().color(color);
        if status == ModuleStatus::Failed {
            colored.bold().to_string()
        } else {
            colored.to_string()
        }
    }

    /// Render a unified diff of the remote state
    fn render_diff(&self, before: &str, after: &str) {
        let differ = ColorizedDiff::with_options(DiffOptions {
            use_color: self.use_color,
            add_color: self.palette.diff_add,
            remove_color: self.palette.diff_remove,
            ..Default::default()
        });

        println!();
        print!("{}", differ.diff(before, after, "current", "desired"));
        let summary = differ.summary(before, after).format(self.use_color);
        if self.use_color {
            println!("{}", summary.bright_black());
        } else {
            println!("{}", summary);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.is_json() {
            let err = serde_json::json!({
                "type": "error",
                "message": message
            });
            eprintln!("{}", serde_json::to_string(&err).unwrap());
            return;
        }

        if self.use_color {
            eprintln!(
                "{} {}",
                "ERROR:".color(self.palette.error).bold(),
                message
            );
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.is_json() {
            let warn = serde_json::json!({
                "type": "warning",
                "message": message
            });
            eprintln!("{}", serde_json::to_string(&warn).unwrap());
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".color(self.palette.warn).bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 || self.is_machine() || self.is_quiet() {
            return;
        }

        if self.use_color {
            println!("{} {}", "INFO:".blue(), message);
        } else {
            println!("INFO: {}", message);
        }
    }

    /// Print a debug message (requires higher verbosity)
    pub fn debug(&self, message: &str) {
        if self.verbosity < 2 || self.is_machine() || self.is_quiet() {
            return;
        }

        if self.use_color {
            println!("{} {}", "DEBUG:".magenta(), message);
        } else {
            println!("DEBUG: {}", message);
        }
    }

    /// Print a plain message (suppressed in minimal mode)
    pub fn plain(&self, message: &str) {
        if self.is_quiet() {
            return;
        }
        println!("{}", message);
    }

    /// Print a list of items
    pub fn list(&self, title: &str, items: &[String]) {
        if self.is_json() {
            let list = serde_json::json!({
                "type": "list",
                "title": title,
                "items": items
            });
            println!("{}", serde_json::to_string_pretty(&list).unwrap());
            return;
        }
        if self.is_quiet() {
            return;
        }

        if self.use_color {
            println!("\n{}:", title.bright_white().bold());
        } else {
            println!("\n{}:", title);
        }

        for item in items {
            if self.use_color {
                println!("  {} {}", "-".bright_black(), item);
            } else {
                println!("  - {}", item);
            }
        }
    }

    /// Create a spinner for indeterminate progress
    pub fn create_spinner(&self, message: &str) -> Option<ProgressBar> {
        if self.format != OutputFormat::Human {
            return None;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        Some(spinner)
    }

    /// Print the elapsed run time
    pub fn finished(&self) {
        if self.is_machine() || self.is_quiet() {
            return;
        }

        let duration_str = format_duration(self.start_time.elapsed());
        if self.use_color {
            println!(
                "\n{} {}",
                "Completed in".bright_black(),
                duration_str.bright_white()
            );
        } else {
            println!("\nCompleted in {}", duration_str);
        }
    }

    /// Flush stdout
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

/// Format a duration as a human-readable string
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 3600 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;
        format!("{}h {}m {}s", hours, mins, secs)
    } else if secs >= 60 {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}
