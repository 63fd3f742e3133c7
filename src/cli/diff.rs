//! Colorized diff output module for sgsync
//!
//! Renders the before/after state of a security group as a unified diff
//! using the similar crate.

use colored::{Color, Colorize};
use similar::{ChangeTag, DiffOp, TextDiff};
use std::fmt::Write;

/// Extract hunk range information from diff operations
/// Returns (old_start, old_len, new_start, new_len) in 1-based line numbers for display
fn hunk_ranges(ops: &[DiffOp]) -> (usize, usize, usize, usize) {
    if ops.is_empty() {
        return (1, 0, 1, 0);
    }
    let first = &ops[0];
    let last = &ops[ops.len() - 1];
    let old_start = first.old_range().start;
    let new_start = first.new_range().start;
    let old_len = last.old_range().end.saturating_sub(old_start);
    let new_len = last.new_range().end.saturating_sub(new_start);
    (old_start + 1, old_len, new_start + 1, new_len)
}

/// Diff display options
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Number of context lines to show
    pub context_lines: usize,
    /// Use colors
    pub use_color: bool,
    /// Color for inserted lines
    pub add_color: Color,
    /// Color for deleted lines
    pub remove_color: Color,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            use_color: true,
            add_color: Color::Green,
            remove_color: Color::Red,
        }
    }
}

/// Colorized unified-diff generator
pub struct ColorizedDiff {
    options: DiffOptions,
}

impl ColorizedDiff {
    /// Create a new colorized diff with default options
    pub fn new() -> Self {
        Self {
            options: DiffOptions::default(),
        }
    }

    /// Create a new colorized diff with custom options
    pub fn with_options(options: DiffOptions) -> Self {
        Self { options }
    }

    /// Generate a unified diff between two state renderings
    pub fn diff(&self, old: &str, new: &str, old_name: &str, new_name: &str) -> String {
        let diff = TextDiff::from_lines(old, new);
        let mut output = String::new();

        if self.options.use_color {
            writeln!(
                output,
                "{}",
                format!("--- {}", old_name).color(self.options.remove_color)
            )
            .unwrap();
            writeln!(
                output,
                "{}",
                format!("+++ {}", new_name).color(self.options.add_color)
            )
            .unwrap();
        } else {
            writeln!(output, "--- {}", old_name).unwrap();
            writeln!(output, "+++ {}", new_name).unwrap();
        }

        for hunk in diff
            .unified_diff()
            .context_radius(self.options.context_lines)
            .iter_hunks()
        {
            let (old_start, old_len, new_start, new_len) = hunk_ranges(hunk.ops());
            let header = format!("@@ -{},{} +{},{} @@", old_start, old_len, new_start, new_len);

            if self.options.use_color {
                writeln!(output, "{}", header.cyan()).unwrap();
            } else {
                writeln!(output, "{}", header).unwrap();
            }

            for change in hunk.iter_changes() {
                let line = change.value();
                let line_display = if line.ends_with('\n') {
                    line.to_string()
                } else {
                    format!("{}\n\\ No newline at end of file\n", line)
                };

                match change.tag() {
                    ChangeTag::Delete => {
                        if self.options.use_color {
                            write!(
                                output,
                                "{}",
                                format!("-{}", line_display).color(self.options.remove_color)
                            )
                            .unwrap();
                        } else {
                            write!(output, "-{}", line_display).unwrap();
                        }
                    }
                    ChangeTag::Insert => {
                        if self.options.use_color {
                            write!(
                                output,
                                "{}",
                                format!("+{}", line_display).color(self.options.add_color)
                            )
                            .unwrap();
                        } else {
                            write!(output, "+{}", line_display).unwrap();
                        }
                    }
                    ChangeTag::Equal => {
                        if self.options.use_color {
                            write!(output, "{}", format!(" {}", line_display).dimmed()).unwrap();
                        } else {
                            write!(output, " {}", line_display).unwrap();
                        }
                    }
                }
            }
        }

        output
    }

    /// Generate a simple diff summary
    pub fn summary(&self, old: &str, new: &str) -> DiffSummary {
        let diff = TextDiff::from_lines(old, new);
        let mut additions = 0;
        let mut deletions = 0;

        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => additions += 1,
                ChangeTag::Delete => deletions += 1,
                _ => {}
            }
        }

        DiffSummary {
            additions,
            deletions,
        }
    }

    /// Check if there are any differences
    pub fn has_changes(&self, old: &str, new: &str) -> bool {
        let diff = TextDiff::from_lines(old, new);
        diff.iter_all_changes().any(|c| c.tag() != ChangeTag::Equal)
    }
}

impl Default for ColorizedDiff {
    fn default() -> Self {
        Self::new()
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of lines added
    pub additions: usize,
    /// Number of lines deleted
    pub deletions: usize,
}

impl DiffSummary {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.additions > 0 || self.deletions > 0
    }

    /// Format as a short string
    pub fn format(&self, use_color: bool) -> String {
        if !self.has_changes() {
            return "no changes".to_string();
        }

        let mut parts = Vec::new();
        if self.additions > 0 {
            let s = format!("+{}", self.additions);
            parts.push(if use_color { s.green().to_string() } else { s });
        }
        if self.deletions > 0 {
            let s = format!("-{}", self.deletions);
            parts.push(if use_color { s.red().to_string() } else { s });
        }
        parts.join(", ")
    }
}
