//! Unified output formatting for the command line.
//!
//! # Design Principles
//! - **Consistent color scheme**: Red for errors, blue for headers, bright_black for muted detail
//! - **Standardized spacing**: Newline before and after messages
//! - **Machine-readable diagnostics**: `E:`/`W:`/`B:` lines keep their exact layout

use crate::core::colors::colorize_line;
use crate::core::diagnostics::{DiagnosticsSink, UserNotifier};
use colored::*;
use std::io::{BufRead, Write};

/// Formats and prints an error message with consistent styling
///
/// # Format
/// ```text
///
/// ✕ Error: <message>
///
/// ```
pub fn print_error(message: &str) {
    eprintln!("\n{} {}\n", "✕ Error:".red(), message.white());
}

/// Formats and prints a success message with consistent styling
pub fn print_success(message: &str) {
    println!("\n{} {}", "✓".green(), message.white());
}

pub fn print_info(message: &str) {
    println!("\n{}\n", message.white());
}

/// Formats and prints a section header
///
/// # Format
/// ```text
///
/// <header>:
///
/// ```
pub fn print_section_header(header: &str) {
    println!("\n{}:\n", header.white());
}

/// Sink printing diagnostic lines to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl DiagnosticsSink for ConsoleSink {
    fn publish(&self, lines: &[String]) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for line in lines {
            if let Err(e) = writeln!(out, "{}", colorize_line(line)) {
                log::debug!("stdout: {e}");
                return;
            }
        }
    }
}

/// Notifier asking on the terminal, or answering yes with `assume_yes`
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier {
    pub assume_yes: bool,
}

impl UserNotifier for ConsoleNotifier {
    fn confirm(&self, message: &str, action: &str) -> bool {
        if self.assume_yes {
            println!("{} {}", message.white(), format!("[{action}]").bright_black());
            return true;
        }

        print!("\n{}\n{} ", message.white(), format!("{action}? [y/N]").blue());
        if let Err(e) = std::io::stdout().flush() {
            log::debug!("stdout: {e}");
        }
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(e) => {
                log::debug!("stdin: {e}");
                false
            }
        }
    }

    fn message(&self, message: &str) {
        print_info(message);
    }
}
