//! Delimiter matching over single lines with resumable state.
//!
//! [`scan_argument`] finds the end of one bracketed argument. When a line
//! ends before the argument closes, the residual balance is reported so the
//! caller can continue on the next line through a [`PendingSpan`].
//!
//! A delimiter counts only at the start of the text or after a character
//! other than `\`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delimiter {
    Brace,
    Bracket,
    Paren,
    /// Same-character family, no nesting
    Quote,
}

impl Delimiter {
    pub fn open(self) -> char {
        match self {
            Self::Brace => '{',
            Self::Bracket => '[',
            Self::Paren => '(',
            Self::Quote => '"',
        }
    }

    pub fn close(self) -> char {
        match self {
            Self::Brace => '}',
            Self::Bracket => ']',
            Self::Paren => ')',
            Self::Quote => '"',
        }
    }

    /// Map an opening character to its bracket family
    pub fn from_open(c: char) -> Option<Self> {
        match c {
            '{' => Some(Self::Brace),
            '[' => Some(Self::Bracket),
            '(' => Some(Self::Paren),
            '"' => Some(Self::Quote),
            _ => None,
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.open())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Byte offset just after the delimiter that closed the argument
    End(usize),
    /// Text ended with this many delimiters still open
    Unclosed(u32),
    /// No delimiter found and nothing was open on entry
    NoMatch,
}

fn is_escaped(text: &str, index: usize) -> bool {
    text[..index].chars().next_back() == Some('\\')
}

/// Scan `text` from byte offset `start` for the end of an argument.
///
/// `balance` is the number of delimiters already open when scanning starts.
/// Quotes do not nest: the next unescaped `"` ends the span.
pub fn scan_argument(text: &str, start: usize, delimiter: Delimiter, balance: u32) -> ScanOutcome {
    let start = start.min(text.len());

    if delimiter == Delimiter::Quote {
        for (offset, c) in text[start..].char_indices() {
            let index = start + offset;
            if c == '"' && !is_escaped(text, index) {
                return ScanOutcome::End(index + 1);
            }
        }
        return ScanOutcome::Unclosed(1);
    }

    let (open, close) = (delimiter.open(), delimiter.close());
    let mut balance = i64::from(balance);
    let mut found = None;

    for (offset, c) in text[start..].char_indices() {
        let index = start + offset;
        if (c != open && c != close) || is_escaped(text, index) {
            continue;
        }
        balance += if c == open { 1 } else { -1 };
        found = Some(index + 1);
        if balance <= 0 {
            break;
        }
    }

    match found {
        _ if balance > 0 => ScanOutcome::Unclosed(balance as u32),
        None => ScanOutcome::NoMatch,
        Some(end) => ScanOutcome::End(end),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupsOutcome {
    /// Offset after the last consecutive group
    End(usize),
    Unclosed { delimiter: Delimiter, balance: u32 },
}

/// Walk consecutive `{}`/`[]`/`()` groups starting exactly at `offset`.
///
/// Scanning stops at the first character that does not open a new group.
pub fn scan_groups(text: &str, mut offset: usize) -> GroupsOutcome {
    while let Some(delimiter) = text[offset..]
        .chars()
        .next()
        .and_then(Delimiter::from_open)
        .filter(|d| *d != Delimiter::Quote)
    {
        match scan_argument(text, offset + 1, delimiter, 1) {
            ScanOutcome::End(end) => offset = end,
            ScanOutcome::Unclosed(balance) => {
                return GroupsOutcome::Unclosed { delimiter, balance }
            }
            ScanOutcome::NoMatch => break,
        }
    }
    GroupsOutcome::End(offset)
}

/// An argument left open at the end of a line.
///
/// Lines are joined with a single space, standing in for the line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSpan {
    pub delimiter: Delimiter,
    pub balance: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume {
    /// `text` is the accumulated span up to and including the closing
    /// delimiter; `end` is the offset in the chunk just after it
    Done { text: String, end: usize },
    Continue(PendingSpan),
}

impl PendingSpan {
    pub fn new(delimiter: Delimiter, balance: u32, text: impl Into<String>) -> Self {
        Self {
            delimiter,
            balance,
            text: text.into(),
        }
    }

    fn joined(&self, chunk: &str) -> String {
        if self.text.is_empty() {
            chunk.to_string()
        } else if chunk.is_empty() {
            self.text.clone()
        } else {
            format!("{} {}", self.text, chunk)
        }
    }

    /// Feed the next chunk of input.
    pub fn resume(self, chunk: &str) -> Resume {
        match scan_argument(chunk, 0, self.delimiter, self.balance) {
            ScanOutcome::End(end) => Resume::Done {
                text: self.joined(&chunk[..end]),
                end,
            },
            ScanOutcome::Unclosed(balance) => Resume::Continue(PendingSpan {
                text: self.joined(chunk),
                balance,
                delimiter: self.delimiter,
            }),
            ScanOutcome::NoMatch => Resume::Continue(PendingSpan {
                text: self.joined(chunk),
                ..self
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_brace_argument() {
        let text = r"\section{Intro} more";
        assert_eq!(
            scan_argument(text, 9, Delimiter::Brace, 1),
            ScanOutcome::End(15)
        );
    }

    #[test]
    fn test_nested_braces() {
        let text = "{a{b}{c{d}}e} tail";
        assert_eq!(scan_argument(text, 0, Delimiter::Brace, 0), ScanOutcome::End(13));
    }

    #[test]
    fn test_escaped_braces_do_not_affect_balance() {
        let text = r"{a \{ b \} c}{x}";
        assert_eq!(scan_argument(text, 0, Delimiter::Brace, 0), ScanOutcome::End(13));

        let escaped_only = r"\{ \} \{";
        assert_eq!(
            scan_argument(escaped_only, 0, Delimiter::Brace, 0),
            ScanOutcome::NoMatch
        );
    }

    #[test]
    fn test_balance_over_many_groups_with_escapes() {
        for n in 1..6 {
            let group = r"{x\{y\}{z}}";
            let text = format!("{{{}}}", group.repeat(n));
            match scan_argument(&text, 0, Delimiter::Brace, 0) {
                ScanOutcome::End(end) => assert_eq!(end, text.len()),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_unclosed_reports_residual_balance() {
        assert_eq!(
            scan_argument("{a{b", 0, Delimiter::Brace, 0),
            ScanOutcome::Unclosed(2)
        );
        assert_eq!(
            scan_argument("no delimiters", 0, Delimiter::Brace, 1),
            ScanOutcome::Unclosed(1)
        );
    }

    #[test]
    fn test_no_match_without_delimiters() {
        assert_eq!(
            scan_argument("plain text", 0, Delimiter::Bracket, 0),
            ScanOutcome::NoMatch
        );
    }

    #[test]
    fn test_families_are_independent() {
        let text = "[a{b]c}";
        assert_eq!(scan_argument(text, 0, Delimiter::Bracket, 0), ScanOutcome::End(5));
        assert_eq!(scan_argument(text, 0, Delimiter::Paren, 0), ScanOutcome::NoMatch);
    }

    #[test]
    fn test_quote_ends_at_next_unescaped_quote() {
        let text = r#""Say \"hi\" now", next"#;
        assert_eq!(scan_argument(text, 1, Delimiter::Quote, 0), ScanOutcome::End(16));
        assert_eq!(
            scan_argument(r#""open"#, 1, Delimiter::Quote, 0),
            ScanOutcome::Unclosed(1)
        );
    }

    #[test]
    fn test_scan_groups_consecutive() {
        let text = r"{\vect}[1]{\mathbf{#1}} rest";
        assert_eq!(scan_groups(text, 0), GroupsOutcome::End(23));
        assert_eq!(scan_groups(text, 23), GroupsOutcome::End(23));
    }

    #[test]
    fn test_scan_groups_unclosed() {
        assert_eq!(
            scan_groups("{a}[b", 0),
            GroupsOutcome::Unclosed {
                delimiter: Delimiter::Bracket,
                balance: 1
            }
        );
    }

    #[test]
    fn test_pending_span_resume() {
        let span = PendingSpan::new(Delimiter::Brace, 1, "{A Long");
        match span.resume("Title}, tail") {
            Resume::Done { text, end } => {
                assert_eq!(text, "{A Long Title}");
                assert_eq!(end, 6);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rechunking_is_idempotent() {
        let full = r"{first {second} \{ third {fourth fifth} sixth}";
        let words: Vec<&str> = full.split(' ').collect();

        for split in 1..words.len() {
            let head = words[..split].join(" ");
            let ScanOutcome::Unclosed(balance) = scan_argument(&head, 0, Delimiter::Brace, 0)
            else {
                panic!("head should be unclosed at split {split}");
            };

            let mut pending = PendingSpan::new(Delimiter::Brace, balance, head);
            let mut result = None;
            for word in &words[split..] {
                match pending.clone().resume(word) {
                    Resume::Done { text, .. } => {
                        result = Some(text);
                        break;
                    }
                    Resume::Continue(next) => pending = next,
                }
            }
            assert_eq!(result.as_deref(), Some(full), "split at {split}");
        }
    }
}
