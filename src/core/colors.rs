//! Color scheme for diagnostic output.
//!
//! # Color Scheme
//! - **Errors**: Red
//! - **Warnings**: Yellow
//! - **Badboxes**: Cyan
//! - **Build headers**: Blue
//! - **Timing and summaries**: Bright black (muted)

use crate::core::diagnostics::DiagnosticKind;
use colored::*;

/// Color function for a diagnostic kind
pub fn get_kind_color_style(kind: DiagnosticKind) -> Box<dyn Fn(&str) -> ColoredString> {
    match kind {
        DiagnosticKind::Error => Box::new(|text: &str| text.red()),
        DiagnosticKind::Warning => Box::new(|text: &str| text.yellow()),
        DiagnosticKind::BadBox => Box::new(|text: &str| text.cyan()),
    }
}

fn kind_of_line(line: &str) -> Option<DiagnosticKind> {
    [DiagnosticKind::Error, DiagnosticKind::Warning, DiagnosticKind::BadBox]
        .into_iter()
        .find(|kind| {
            line.strip_prefix(kind.prefix())
                .is_some_and(|rest| rest.starts_with(": "))
        })
}

/// Colored form of one published line.
///
/// Only the `E:`/`W:`/`B:` prefix is colored, so the location stays
/// readable for jump-to-error tooling.
pub fn colorize_line(line: &str) -> String {
    if let Some(kind) = kind_of_line(line) {
        let color_fn = get_kind_color_style(kind);
        let (prefix, rest) = line.split_at(2);
        return format!("{}{}", color_fn(prefix), rest);
    }
    if line.starts_with("[Compile ") {
        return line.blue().bold().to_string();
    }
    if line.starts_with("[Finished in ") {
        return line.bright_black().to_string();
    }
    if line.starts_with("COULD NOT COMPILE!") {
        return line.red().bold().to_string();
    }
    line.to_string()
}
