//! Output formatting module for nagstack
//!
//! Human-facing messages go to stderr; command results (templates, reports, DOT
//! graphs) go to stdout so they can be piped.

use colored::Colorize;
use std::io::{self, Write};

/// Output formatter for terminal messages
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// Verbosity level
    verbosity: u8,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, verbosity: u8) -> Self {
        Self {
            use_color,
            verbosity,
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.use_color {
            eprintln!("\n{}", title.cyan().bold());
            eprintln!("{}", "-".repeat(title.len()).cyan());
        } else {
            eprintln!("\n{}", title);
            eprintln!("{}", "-".repeat(title.len()));
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "✓".green().bold(), message);
        } else {
            eprintln!("OK: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 {
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "INFO:".blue(), message);
        } else {
            eprintln!("INFO: {}", message);
        }
    }

    /// Print command output to stdout
    pub fn result(&self, content: &str) -> io::Result<()> {
        write_result(&mut io::stdout().lock(), content)
    }

    /// Print a list of items
    pub fn list(&self, title: &str, items: &[String]) {
        if self.use_color {
            println!("{}:", title.bright_white().bold());
        } else {
            println!("{}:", title);
        }

        for item in items {
            if self.use_color {
                println!("  {} {}", "-".bright_black(), item);
            } else {
                println!("  - {}", item);
            }
        }
    }

    /// Print a table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        // Calculate column widths
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let mut header_line = String::new();
        for (i, h) in headers.iter().enumerate() {
            if i > 0 {
                header_line.push_str(" | ");
            }
            header_line.push_str(&format!("{:width$}", h, width = widths[i]));
        }
        if self.use_color {
            println!("{}", header_line.bright_white().bold());
        } else {
            println!("{}", header_line);
        }

        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        if self.use_color {
            println!("{}", sep.join("-+-").bright_black());
        } else {
            println!("{}", sep.join("-+-"));
        }

        for row in rows {
            let mut row_line = String::new();
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    row_line.push_str(" | ");
                }
                if i < widths.len() {
                    row_line.push_str(&format!("{:width$}", cell, width = widths[i]));
                }
            }
            println!("{}", row_line.trim_end());
        }
    }
}

/// Write `content` followed by a trailing newline if it lacks one.
fn write_result<W: Write>(writer: &mut W, content: &str) -> io::Result<()> {
    writer.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
