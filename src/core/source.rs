//! Reading TeX and BibTeX sources into logical lines.

use crate::core::error::{Result, TexSenseError};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Option directives are only honoured among the first lines of a file
const OPTION_LINE_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    /// 1-based
    pub line_number: usize,
    /// Byte range of the raw line, line break included
    pub range: (usize, usize),
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceText {
    pub lines: Vec<SourceLine>,
    /// `%` lines from the head of the file, kept for option directives
    pub option_lines: Vec<String>,
}

/// Read a file with lossy UTF-8 decoding and split it into logical lines.
pub fn read_source(path: &Path, strip_comments: bool) -> Result<SourceText> {
    if !path.is_file() {
        return Err(TexSenseError::source_missing(path));
    }
    let bytes = std::fs::read(path)?;
    Ok(parse_source(&String::from_utf8_lossy(&bytes), strip_comments))
}

/// Split `text` into trimmed, non-empty lines.
///
/// With `strip_comments`, whole-line comments are dropped and inline
/// comments starting at an unescaped `%` are cut off.
pub fn parse_source(text: &str, strip_comments: bool) -> SourceText {
    let mut source = SourceText::default();
    let mut offset = 0;

    for (index, raw) in text.split_inclusive('\n').enumerate() {
        let line_number = index + 1;
        let range = (offset, offset + raw.len());
        offset += raw.len();

        let line = raw.trim();
        if line_number < OPTION_LINE_LIMIT && line.starts_with('%') {
            source.option_lines.push(line.to_string());
        }
        if line.is_empty() || (strip_comments && line.starts_with('%')) {
            continue;
        }

        let content = if strip_comments {
            strip_inline_comment(line).trim_end()
        } else {
            line
        };
        if !content.is_empty() {
            source.lines.push(SourceLine {
                line_number,
                range,
                content: content.to_string(),
            });
        }
    }
    source
}

/// Cut a line at its first `%` not preceded by `\`
pub fn strip_inline_comment(line: &str) -> &str {
    let mut previous = None;
    for (index, c) in line.char_indices() {
        if c == '%' && previous != Some('\\') {
            return &line[..index];
        }
        previous = Some(c);
    }
    line
}

/// Option directives found in the head of a TeX file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TexOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrases: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tikz: Option<String>,
}

lazy_static! {
    static ref RE_MODELINE: Regex =
        Regex::new(r"(?i)%\s*-\*-\s*(?P<key>\w+)\s*:\s*(?P<value>.+)-\*-").unwrap();
    static ref RE_TEX_ROOT: Regex =
        Regex::new(r"(?i)%\s*!TEX\s+root\s*=\s*(?P<value>.*)$").unwrap();
}

impl TexOptions {
    /// Parse `% -*- key: value -*-` and `% !TEX root = value` directives
    pub fn parse(option_lines: &[String]) -> Self {
        let mut options = Self::default();
        for line in option_lines {
            if let Some(caps) = RE_MODELINE.captures(line) {
                let value = caps["value"].trim().to_string();
                if options.set(&caps["key"], value) {
                    continue;
                }
            }
            if let Some(caps) = RE_TEX_ROOT.captures(line) {
                options.root = Some(caps["value"].trim().to_string());
            }
        }
        log::debug!("options: {options:?}");
        options
    }

    fn set(&mut self, key: &str, value: String) -> bool {
        let slot = match key {
            "root" => &mut self.root,
            "program" => &mut self.program,
            "prefix" => &mut self.prefix,
            "phrases" => &mut self.phrases,
            "pdf" => &mut self.pdf,
            "tikz" => &mut self.tikz,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "root" => self.root.as_deref(),
            "program" => self.program.as_deref(),
            "prefix" => self.prefix.as_deref(),
            "phrases" => self.phrases.as_deref(),
            "pdf" => self.pdf.as_deref(),
            "tikz" => self.tikz.as_deref(),
            _ => None,
        }
    }
}
