//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use codereflect_core::diff::split_lines;
use codereflect_core::{DivergenceRange, HighlightSet, Notifier};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a highlight set against the reference text it applies to
    pub fn print_highlights(&self, reference: Option<&str>, ranges: &HighlightSet) {
        match self.format {
            OutputFormat::Human => {
                if ranges.is_empty() {
                    println!("✓ Matches reference");
                    return;
                }
                println!("✗ {} divergent line(s)", ranges.len());
                let lines = reference.map(split_lines).unwrap_or_default();
                for range in ranges {
                    let location = format!("{}:{}", range.line + 1, range.start + 1);
                    match lines.get(range.line) {
                        Some(text) => {
                            println!("  {:>8} | {}", location, text);
                            println!("  {:>8} | {}", "", underline(range.start, range.width()));
                        }
                        None => println!("  {:>8} |", location),
                    }
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"event": "highlights", "ranges": ranges})
                );
            }
            OutputFormat::Quiet => {
                for range in ranges {
                    println!("{}", location_span(range));
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an error message (shown even in quiet mode)
    pub fn error(&self, msg: &str) {
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "error", "message": msg})
                );
            }
            OutputFormat::Human | OutputFormat::Quiet => eprintln!("✗ {}", msg),
        }
    }
}

impl Notifier for Output {
    fn notify(&self, message: &str) {
        self.message(message);
    }

    fn notify_error(&self, message: &str) {
        self.error(message);
    }
}

/// 1-based `line:first-last` with an inclusive last column
///
/// A zero-width range prints as `line:column`.
fn location_span(range: &DivergenceRange) -> String {
    if range.width() == 0 {
        format!("{}:{}", range.line + 1, range.start + 1)
    } else {
        format!("{}:{}-{}", range.line + 1, range.start + 1, range.end)
    }
}

/// Caret marker under `width` columns starting at `start`
///
/// Empty ranges still get one caret so the position is visible.
fn underline(start: usize, width: usize) -> String {
    format!("{}{}", " ".repeat(start), "^".repeat(width.max(1)))
}
