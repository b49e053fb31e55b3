//! Diagnostic records produced by a build and the collaborators they are
//! handed to.
//!
//! The line format `E: <path>:<line> <message>` (`W:` for warnings, `B:`
//! for badboxes) is consumed by jump-to-error tooling and must stay exact.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Error,
    Warning,
    BadBox,
}

impl DiagnosticKind {
    pub fn prefix(self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warning => 'W',
            Self::BadBox => 'B',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// `None` for synthetic records that belong to no source file
    pub file: Option<PathBuf>,
    /// 1-based, `0` when unknown
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            file: Some(file.into()),
            line,
            message: message.into(),
        }
    }

    /// Error that is reported as a bare message
    pub fn synthetic(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            file: None,
            line: 0,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(
                f,
                "{}: {}:{} {}",
                self.kind.prefix(),
                file.display(),
                self.line,
                self.message
            ),
            None => f.write_str(&self.message),
        }
    }
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("1 {one}")
    } else {
        format!("{count} {many}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub badboxes: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.kind {
            DiagnosticKind::Error => self.errors.push(diagnostic),
            DiagnosticKind::Warning => self.warnings.push(diagnostic),
            DiagnosticKind::BadBox => self.badboxes.push(diagnostic),
        }
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.badboxes.extend(other.badboxes);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.badboxes.is_empty()
    }

    /// `1 error, 2 warnings, 0 badboxes`
    pub fn summary(&self) -> String {
        format!(
            "{}, {}, {}",
            plural(self.errors.len(), "error", "errors"),
            plural(self.warnings.len(), "warning", "warnings"),
            plural(self.badboxes.len(), "badbox", "badboxes")
        )
    }

    /// Errors, warnings and badboxes; every non-empty block ends with a
    /// blank line
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for block in [&self.errors, &self.warnings, &self.badboxes] {
            if block.is_empty() {
                continue;
            }
            lines.extend(block.iter().map(Diagnostic::to_string));
            lines.push(String::new());
        }
        lines
    }

    /// [`Diagnostics::lines`] followed by the summary and build duration
    pub fn report(&self, elapsed: Duration) -> Vec<String> {
        let mut lines = self.lines();
        lines.push(self.summary());
        lines.push(String::new());
        lines.push(format!("[Finished in {:.2}s]", elapsed.as_secs_f64()));
        lines
    }
}

/// Receives formatted diagnostic lines for display
pub trait DiagnosticsSink: Send + Sync {
    fn publish(&self, lines: &[String]);
}

/// Asks the user before actions that change their files
pub trait UserNotifier: Send + Sync {
    fn confirm(&self, message: &str, action: &str) -> bool;
    fn message(&self, message: &str);
}

/// Sink that keeps every published line
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl DiagnosticsSink for MemorySink {
    fn publish(&self, lines: &[String]) {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend(lines.iter().cloned());
    }
}

/// Notifier with a fixed answer for non-interactive use
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl UserNotifier for FixedAnswer {
    fn confirm(&self, message: &str, action: &str) -> bool {
        log::info!("{message} [{action}: {}]", if self.0 { "yes" } else { "no" });
        self.0
    }

    fn message(&self, message: &str) {
        log::info!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_format() {
        let record = Diagnostic::new(DiagnosticKind::BadBox, "/doc/main.tex", 42, "Overfull \\hbox");
        assert_eq!(record.to_string(), "B: /doc/main.tex:42 Overfull \\hbox");

        let synthetic = Diagnostic::synthetic(DiagnosticKind::Error, "COULD NOT COMPILE!");
        assert_eq!(synthetic.to_string(), "COULD NOT COMPILE!");
    }

    #[test]
    fn test_summary_pluralization() {
        let mut diagnostics = Diagnostics::default();
        assert_eq!(diagnostics.summary(), "0 errors, 0 warnings, 0 badboxes");

        diagnostics.push(Diagnostic::new(DiagnosticKind::Error, "a.tex", 1, "x"));
        diagnostics.push(Diagnostic::new(DiagnosticKind::BadBox, "a.tex", 2, "y"));
        assert_eq!(diagnostics.summary(), "1 error, 0 warnings, 1 badbox");
    }

    #[test]
    fn test_report_blocks() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push(Diagnostic::new(DiagnosticKind::Warning, "a.tex", 3, "w1"));
        diagnostics.push(Diagnostic::new(DiagnosticKind::Warning, "a.tex", 4, "w2"));

        assert_eq!(
            diagnostics.report(Duration::from_millis(1500)),
            vec![
                "W: a.tex:3 w1".to_string(),
                "W: a.tex:4 w2".to_string(),
                String::new(),
                "0 errors, 2 warnings, 0 badboxes".to_string(),
                String::new(),
                "[Finished in 1.50s]".to_string(),
            ]
        );
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::default();
        sink.publish(&["one".to_string()]);
        sink.publish(&["two".to_string()]);
        assert_eq!(sink.lines(), vec!["one", "two"]);
        assert!(FixedAnswer(true).confirm("Update?", "Update"));
    }
}
