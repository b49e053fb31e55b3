//! Line-oriented BibTeX tokenizer.
//!
//! Entries start at lines beginning with `@`. Field values are `{...}`,
//! `"..."` or a bare digit run; braced and quoted values may span lines, in
//! which case the open value is carried to the next line as a
//! [`PendingSpan`] and the lines are joined with a space.

use crate::core::bib::{title_case, BibEntry};
use crate::core::scanner::{scan_argument, Delimiter, PendingSpan, Resume, ScanOutcome};
use crate::core::source::SourceLine;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref RE_HEADER: Regex = Regex::new(r"^@\s*(?P<type>\w+)\s*\{\s*(?P<key>[^,\s]+)\s*(,|$)").unwrap();
    static ref RE_FIELD: Regex = Regex::new(r"\b(?P<field>\w+)\s*=\s*").unwrap();
    static ref RE_WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Entry kinds that carry no citation
const SKIPPED_ENTRIES: [&str; 3] = ["@comment", "@string", "@preamble"];

struct OpenEntry {
    key: String,
    entry_type: String,
    fields: BTreeMap<String, String>,
}

impl OpenEntry {
    fn finish(self) -> BibEntry {
        BibEntry::new(self.key, self.entry_type, self.fields)
    }
}

struct PendingField {
    name: String,
    span: PendingSpan,
}

#[derive(Default)]
struct Tokenizer {
    entries: Vec<BibEntry>,
    current: Option<OpenEntry>,
    pending: Option<PendingField>,
}

fn clean_value(raw: &str) -> String {
    RE_WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

impl Tokenizer {
    fn flush(&mut self) {
        if let Some(entry) = self.current.take() {
            self.entries.push(entry.finish());
        }
    }

    fn store(&mut self, name: &str, raw: &str) {
        let value = clean_value(raw);
        if value.is_empty() {
            return;
        }
        if let Some(entry) = self.current.as_mut() {
            entry.fields.insert(name.to_lowercase(), value);
        }
    }

    fn header(&mut self, line: &SourceLine) {
        self.flush();
        self.pending = None;

        let lower = line.content.to_lowercase();
        if SKIPPED_ENTRIES.iter().any(|kind| lower.starts_with(kind)) {
            return;
        }
        match RE_HEADER.captures(&line.content) {
            Some(caps) => {
                self.current = Some(OpenEntry {
                    key: caps["key"].to_string(),
                    entry_type: title_case(&caps["type"]),
                    fields: BTreeMap::new(),
                });
            }
            None => log::warn!("Skipping malformed entry header on line {}: {}", line.line_number, line.content),
        }
    }

    fn resume(&mut self, pending: PendingField, text: &str) {
        let close = pending.span.delimiter.close();
        match pending.span.resume(text) {
            Resume::Done { text, .. } => {
                let value = text.strip_suffix(close).unwrap_or(&text).to_string();
                self.store(&pending.name, &value);
            }
            Resume::Continue(span) => {
                self.pending = Some(PendingField {
                    name: pending.name,
                    span,
                })
            }
        }
    }

    fn field(&mut self, line: &SourceLine) {
        let text = line.content.as_str();
        let Some(caps) = RE_FIELD.captures(text) else {
            return;
        };
        let name = caps["field"].to_string();
        let start = caps.get(0).map_or(text.len(), |m| m.end());
        let rest = &text[start..];

        let Some(first) = rest.chars().next() else {
            return;
        };
        let delimiter = match first {
            '{' => Delimiter::Brace,
            '"' => Delimiter::Quote,
            c if c.is_ascii_digit() => {
                let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
                self.store(&name, &digits);
                return;
            }
            _ => {
                log::debug!("Ignoring bare value of '{name}' on line {}", line.line_number);
                return;
            }
        };

        let content_start = start + 1;
        match scan_argument(text, content_start, delimiter, 1) {
            ScanOutcome::End(end) => self.store(&name, &text[content_start..end - 1]),
            ScanOutcome::Unclosed(balance) => {
                self.pending = Some(PendingField {
                    name,
                    span: PendingSpan::new(delimiter, balance, &text[content_start..]),
                });
            }
            ScanOutcome::NoMatch => {}
        }
    }

    fn line(&mut self, line: &SourceLine) {
        if line.content.starts_with('@') {
            self.header(line);
        } else if let Some(pending) = self.pending.take() {
            self.resume(pending, &line.content);
        } else if self.current.is_some() {
            self.field(line);
        }
    }

    fn finish(mut self) -> Vec<BibEntry> {
        if self.pending.is_some() {
            if let Some(entry) = &self.current {
                log::warn!("Dropping entry '{}': value left open at end of file", entry.key);
            }
            self.current = None;
        }
        self.flush();
        self.entries
    }
}

/// Tokenize the logical lines of a `.bib` file into entries.
///
/// A malformed entry is skipped without affecting the entries around it.
pub fn find_cites(lines: &[SourceLine]) -> Vec<BibEntry> {
    let mut tokenizer = Tokenizer::default();
    for line in lines {
        tokenizer.line(line);
    }
    tokenizer.finish()
}
