//! Recovers errors, warnings and badboxes from a compiler log.
//!
//! The log is consumed one line at a time by a small state machine. The
//! engine interleaves diagnostics with `(file` and `)` markers as it opens
//! and closes inputs, so a stack of open files is kept alongside: explicit
//! `:<+ name` / `:<-` markers where the engine writes them, a parenthesis
//! heuristic otherwise. Every record is attributed to the innermost open
//! file that exists on disk, or to the compiled document.

use crate::core::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::core::error::Result;
use crate::core::paths::{normalize, parent_dir};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Lines an unterminated error message may take
const MAX_ERROR_LINES: usize = 3;
/// Lines between an error and its `l.N` marker
const MAX_LINE_NUMBER_LINES: usize = 10;
/// Lines a warning or badbox may take
const MAX_MESSAGE_LINES: usize = 5;
/// Last column of a log line before TeX wraps it
const WRAP_COLUMN: usize = 78;

lazy_static! {
    static ref RE_LATEX_ERROR: Regex = Regex::new(r"(?i)^! LaTeX Error: (.*)$").unwrap();
    static ref RE_WRAPPER_ERROR: Regex = Regex::new(r"(?i)^Error: pdflatex (.*)$").unwrap();
    static ref RE_TEX_ERROR: Regex = Regex::new(r"^! (.*)\.$").unwrap();
    static ref RE_PACKAGE_ERROR: Regex = Regex::new(r"(?i)^! Package (.*) Error:(.*)$").unwrap();
    static ref RE_LINE_NUMBER: Regex = Regex::new(r"^(\.{3} )?l\.([0-9]+)(.*)").unwrap();
    static ref RE_WARNING: Regex =
        Regex::new(r"(?i)^(((! )?(La|pdf)TeX)|Package|Class) .*Warning *:(?P<message>.*)").unwrap();
    static ref RE_NO_FILE: Regex = Regex::new(r"No file (.*)").unwrap();
    static ref RE_MISSING_FILE: Regex = Regex::new(r"File .* does not exist\.").unwrap();
    static ref RE_INPUT_LINE: Regex = Regex::new(r"(?i)(.*) on input line ([0-9]+)\.$").unwrap();
    static ref RE_BADBOX: Regex = Regex::new(r"(?i)^(Over|Under)(full \\[hv]box .*)").unwrap();
    static ref RE_AT_LINES: Regex = Regex::new(r"(?i)(.*) at lines ([0-9]+)--([0-9]+)").unwrap();
    static ref RE_AT_LINE: Regex = Regex::new(r"(?i)(.*) at line ([0-9]+)").unwrap();
    static ref RE_OUTPUT_ACTIVE: Regex = Regex::new(r"(?i)(.*)has occurred while \\output is active").unwrap();
    static ref RE_EXTENSION: Regex = Regex::new(r"(?i)\.(tex|bib|bbl|aux)").unwrap();
    static ref RE_BLANKS: Regex = Regex::new(r"[ \t]+").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    /// Collecting the name after an explicit `:<+` marker
    FileName,
    /// A heuristic file name was cut off at the end of the previous line
    FileNameHeuristic,
    Error,
    LineNumber,
    Warning,
    BadBox,
}

#[derive(Debug, Clone)]
struct Frame {
    name: String,
    explicit: bool,
}

/// Record being captured across lines
#[derive(Debug, Default)]
struct Capture {
    kind: Option<DiagnosticKind>,
    message: String,
    source_line: usize,
    /// Log line the record started on
    start: usize,
}

/// Keeps the line structure TeX relies on: one leading and one trailing
/// blank survive trimming.
fn prepare(raw: &str) -> String {
    let mut line = String::with_capacity(raw.len() + 2);
    if raw.starts_with(char::is_whitespace) {
        line.push(' ');
    }
    line.push_str(raw.trim());
    let mut tail = raw.chars().rev();
    if tail.next().is_some_and(char::is_whitespace) && tail.next().is_some_and(char::is_whitespace) {
        line.push(' ');
    }
    line
}

fn error_message(line: &str) -> Option<String> {
    let patterns: [(&Regex, usize); 4] = [
        (&*RE_LATEX_ERROR, 1),
        (&*RE_WRAPPER_ERROR, 1),
        (&*RE_TEX_ERROR, 1),
        (&*RE_PACKAGE_ERROR, 2),
    ];
    patterns.iter().find_map(|(re, group)| {
        re.captures(line)
            .and_then(|c| c.get(*group))
            .map(|m| m.as_str().to_string())
    })
}

fn number(text: &str) -> usize {
    text.parse().unwrap_or(0)
}

pub struct LogParser {
    tex_dir: PathBuf,
    tex_name: String,
    state: State,
    frames: Vec<Frame>,
    partial_name: String,
    output_line: usize,
    capture: Capture,
    diagnostics: Diagnostics,
}

impl LogParser {
    /// Parser for the log of compiling `tex_path`
    pub fn new(tex_path: &Path) -> Self {
        Self {
            tex_dir: parent_dir(tex_path),
            tex_name: tex_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            state: State::Start,
            frames: Vec::new(),
            partial_name: String::new(),
            output_line: 0,
            capture: Capture::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Read and parse a log file; undecodable bytes are replaced
    pub fn parse_file(tex_path: &Path, log_path: &Path) -> Result<Diagnostics> {
        let bytes = std::fs::read(log_path)?;
        Ok(Self::new(tex_path).parse(&String::from_utf8_lossy(&bytes)))
    }

    /// Records still being captured when the text ends are dropped.
    pub fn parse(mut self, text: &str) -> Diagnostics {
        for raw in text.split_inclusive('\n') {
            let line = prepare(raw);
            self.parse_line(&line);
            self.output_line += 1;
        }
        if self.capture.kind.is_some() {
            log::debug!("dropping unfinished record: {}", self.capture.message.trim());
        }
        self.diagnostics
    }

    fn parse_line(&mut self, line: &str) {
        match self.state {
            State::Start => {
                if !(self.detect_error(line) || self.detect_warning(line) || self.detect_badbox(line)) {
                    self.update_file_stack(line);
                }
            }
            State::Warning => {
                self.detect_warning(line);
            }
            State::Error | State::LineNumber => {
                self.detect_error(line);
            }
            State::BadBox => {
                self.detect_badbox(line);
            }
            State::FileName | State::FileNameHeuristic => self.update_file_stack(line),
        }
    }

    fn lines_since_start(&self) -> usize {
        self.output_line.saturating_sub(self.capture.start)
    }

    fn begin(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.capture = Capture {
            kind: Some(kind),
            message: message.into(),
            source_line: 0,
            start: self.output_line,
        };
    }

    fn file_exists(&self, name: &str) -> bool {
        let path = Path::new(name);
        if path.is_absolute() {
            path.is_file()
        } else {
            self.tex_dir.join(path).is_file()
        }
    }

    /// Emit the captured record and return to `Start`
    fn finish(&mut self) {
        self.state = State::Start;
        let capture = std::mem::take(&mut self.capture);
        let Some(kind) = capture.kind else {
            return;
        };

        while self.frames.last().is_some_and(|f| !self.file_exists(&f.name)) {
            self.frames.pop();
        }
        let name = match self.frames.last() {
            Some(frame) => frame.name.clone(),
            None => format!("./{}", self.tex_name),
        };
        let path = Path::new(&name);
        let file = if path.is_absolute() {
            path.to_path_buf()
        } else {
            normalize(&self.tex_dir.join(path))
        };

        let message = RE_BLANKS.replace_all(capture.message.trim(), " ").into_owned();
        self.diagnostics
            .push(Diagnostic::new(kind, file, capture.source_line, message));
    }

    fn detect_error(&mut self, line: &str) -> bool {
        match self.state {
            State::Start => {
                let Some(message) = error_message(line) else {
                    return false;
                };
                self.begin(DiagnosticKind::Error, message);
                self.state = if line.ends_with('.') {
                    State::LineNumber
                } else {
                    State::Error
                };
                true
            }
            State::Error => {
                self.capture.message.push_str(line);
                if line.ends_with('.') {
                    self.state = State::LineNumber;
                } else if self.lines_since_start() > MAX_ERROR_LINES {
                    log::warn!("Bailing out: error description spans more than {MAX_ERROR_LINES} lines");
                    self.finish();
                }
                false
            }
            State::LineNumber => {
                if let Some(c) = RE_LINE_NUMBER.captures(line) {
                    self.capture.source_line = number(&c[2]);
                    self.capture.message.push_str(&c[3]);
                    self.finish();
                } else if self.lines_since_start() > MAX_LINE_NUMBER_LINES {
                    log::warn!("Bailing out: no TeX line number found for an error");
                    self.capture.source_line = 0;
                    self.finish();
                }
                false
            }
            _ => false,
        }
    }

    fn detect_warning(&mut self, line: &str) -> bool {
        match self.state {
            State::Start => {
                if let Some(c) = RE_WARNING.captures(line) {
                    self.begin(DiagnosticKind::Warning, &c["message"]);
                    self.resolve_warning(line);
                } else if let Some(m) = RE_NO_FILE.find(line).or_else(|| RE_MISSING_FILE.find(line)) {
                    self.begin(DiagnosticKind::Warning, m.as_str());
                    self.finish();
                } else {
                    return false;
                }
                true
            }
            State::Warning => {
                self.capture.message.push_str(line);
                self.resolve_warning(line);
                false
            }
            _ => false,
        }
    }

    fn resolve_warning(&mut self, line: &str) {
        let resolved = RE_INPUT_LINE
            .captures(&self.capture.message)
            .map(|c| (c[1].to_string(), number(&c[2])));

        if let Some((message, source_line)) = resolved {
            self.capture.message = message;
            self.capture.source_line = source_line;
            self.finish();
        } else if self.capture.message.ends_with('.') || line.trim().is_empty() {
            self.finish();
        } else if self.lines_since_start() > MAX_MESSAGE_LINES {
            log::warn!("Bailing out: warning spans more than {MAX_MESSAGE_LINES} lines");
            self.finish();
        } else {
            self.state = State::Warning;
        }
    }

    fn detect_badbox(&mut self, line: &str) -> bool {
        match self.state {
            State::Start => {
                if !RE_BADBOX.is_match(line) {
                    return false;
                }
                self.begin(DiagnosticKind::BadBox, line);
                self.resolve_badbox(line);
                true
            }
            State::BadBox => {
                self.capture.message.push_str(line);
                self.resolve_badbox(line);
                false
            }
            _ => false,
        }
    }

    fn resolve_badbox(&mut self, line: &str) {
        let message = &self.capture.message;
        let resolved = if let Some(c) = RE_AT_LINES.captures(message) {
            Some((c[1].to_string(), number(&c[2]).min(number(&c[3]))))
        } else if let Some(c) = RE_AT_LINE.captures(message) {
            Some((c[1].to_string(), number(&c[2])))
        } else {
            RE_OUTPUT_ACTIVE.captures(message).map(|c| (c[1].to_string(), 0))
        };

        if let Some((message, source_line)) = resolved {
            self.capture.message = message;
            self.capture.source_line = source_line;
            self.finish();
        } else if line.trim().is_empty() {
            self.finish();
        } else if self.lines_since_start() > MAX_MESSAGE_LINES {
            log::warn!("Bailing out: badbox spans more than {MAX_MESSAGE_LINES} lines");
            self.finish();
        } else {
            self.state = State::BadBox;
        }
    }

    fn update_file_stack(&mut self, line: &str) {
        match self.state {
            State::Start | State::FileNameHeuristic => {
                if let Some(name) = line.strip_prefix(":<+ ") {
                    self.partial_name = name.trim().to_string();
                    self.state = State::FileName;
                } else if line.starts_with(":<-") {
                    self.frames.pop();
                    self.state = State::Start;
                } else {
                    self.update_file_stack_heuristic(line);
                }
            }
            State::FileName => {
                if line.starts_with('(') || line.starts_with("\\openout") {
                    let name = std::mem::take(&mut self.partial_name);
                    self.frames.push(Frame { name, explicit: true });
                    self.state = State::Start;
                } else if line.starts_with('!') {
                    self.partial_name.clear();
                    self.state = State::Start;
                    self.detect_error(line);
                } else if line.starts_with("No file") {
                    self.partial_name.clear();
                    self.state = State::Start;
                    self.detect_warning(line);
                } else {
                    self.partial_name.push_str(line.trim());
                }
            }
            _ => {}
        }
    }

    fn push_heuristic_frame(&mut self) {
        let mut name = self.partial_name.clone();
        if cfg!(windows) {
            name = name.trim_matches('"').to_string();
        }
        self.frames.push(Frame { name, explicit: false });
        self.state = State::Start;
    }

    /// `(` opens a file whose name follows directly; the name ends at a
    /// known extension, a `)`, an existing path or the end of a short
    /// line. A name running into the wrap column continues on the next
    /// line. `)` closes the innermost heuristic frame.
    fn update_file_stack_heuristic(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let mut expect_name = self.state == State::FileNameHeuristic;
        let mut index = 0;

        if expect_name && chars.first() == Some(&')') {
            self.push_heuristic_frame();
            expect_name = false;
        }

        for i in 0..chars.len() {
            let is_last = i + 1 == chars.len();
            let next_is_terminator = !is_last && {
                let window: String = chars[i.saturating_sub(3)..=i].iter().collect();
                chars[i + 1] == ')' || RE_EXTENSION.is_match(&window)
            };

            if expect_name && (is_last || next_is_terminator) {
                self.partial_name.extend(&chars[index..=i]);
                if self.partial_name.is_empty() {
                    continue;
                }

                if (is_last && i < WRAP_COLUMN) || next_is_terminator || self.file_exists(&self.partial_name) {
                    self.push_heuristic_frame();
                    expect_name = false;
                } else if is_last {
                    self.state = State::FileNameHeuristic;
                } else {
                    self.state = State::Start;
                    self.partial_name.clear();
                    expect_name = false;
                }
            } else if chars[i] == '(' {
                self.state = State::Start;
                self.partial_name.clear();
                expect_name = true;
                index = i + 1;
            } else if chars[i] == ')' && self.frames.last().is_some_and(|f| !f.explicit) {
                self.frames.pop();
            }
        }
    }
}
