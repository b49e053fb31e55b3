//! Common assertion helpers for command output
//!
//! Predicates for diagnostic lines, summaries and error messages.

#![allow(dead_code)]

use predicates::prelude::*;
use std::path::Path;

/// A diagnostic line in the exact `E:`/`W:`/`B:` format
pub fn has_diagnostic(prefix: char, file: &Path, line: usize, message: &str) -> impl Predicate<str> {
    predicates::str::contains(format!("{prefix}: {}:{line} {message}", file.display()))
}

/// The build summary line
pub fn has_summary(summary: &str) -> impl Predicate<str> {
    predicates::str::contains(summary)
}

/// Creates a predicate that checks for the missing-file error
pub fn no_such_file() -> impl Predicate<str> {
    predicates::str::contains("No such file")
}

/// Creates a predicate that checks for a section header
pub fn has_section(name: &str) -> impl Predicate<str> {
    predicates::str::contains(format!("{name}:"))
}
