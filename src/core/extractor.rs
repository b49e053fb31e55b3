//! Command invocation extraction over logical source lines.
//!
//! # Public API
//! - [`CommandPattern`]: compiled `\name{...}` matcher, single or full mode
//! - [`find_command_arguments`]: every distinct invocation with its arguments
//! - [`split_command`]: command name and bracketed arguments of a raw tag
//! - [`document_class`], [`use_packages`], [`list_words`]: derived facts
//!
//! Full mode follows consecutive bracket groups and carries an unclosed
//! group over to the following lines. Single mode takes exactly one
//! argument from the same line.

use crate::core::config::PhraseSettings;
use crate::core::scanner::{scan_argument, scan_groups, Delimiter, GroupsOutcome, PendingSpan, Resume, ScanOutcome};
use crate::core::source::SourceLine;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub delimiter: Delimiter,
    pub content: String,
}

impl Argument {
    pub fn new(delimiter: Delimiter, content: impl Into<String>) -> Self {
        Self {
            delimiter,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOccurrence {
    pub tag: String,
    pub line: usize,
    pub arguments: Vec<Argument>,
}

impl CommandOccurrence {
    /// Content of the first argument in the given bracket family
    pub fn first(&self, delimiter: Delimiter) -> Option<&str> {
        self.arguments
            .iter()
            .find(|a| a.delimiter == delimiter)
            .map(|a| a.content.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CommandPattern {
    regex: Regex,
    single: bool,
}

impl CommandPattern {
    /// Match `\<name>` followed by any number of bracket groups
    pub fn full(name: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(&format!(r"\\(?:{name})(?P<start>[\{{\[\(])"))?,
            single: false,
        })
    }

    /// Match `\<name>` followed by one argument closed on the same line
    pub fn single(name: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(&format!(
                r"\\(?:{name})(?P<start>[\{{\[\(])(?P<content>[^\}}\]\)]+)[\}}\]\)]"
            ))?,
            single: true,
        })
    }
}

lazy_static! {
    static ref DOCUMENTCLASS: CommandPattern = CommandPattern::full("documentclass").unwrap();
    static ref USEPACKAGE: CommandPattern = CommandPattern::full("usepackage").unwrap();
    static ref RE_COMMAND_NAME: Regex = Regex::new(r"\\([^\{\[\(]+)").unwrap();
    static ref RE_NEXT_GROUP: Regex = Regex::new(r"^\s*[\{\[\(]").unwrap();
    static ref RE_WORD_RUN: Regex = Regex::new(r"[\w ]+").unwrap();
}

struct Collector {
    seen: HashSet<String>,
    found: Vec<CommandOccurrence>,
}

impl Collector {
    fn push(&mut self, tag: String, line: usize, arguments: impl FnOnce(&str) -> Vec<Argument>) {
        if self.seen.contains(&tag) {
            return;
        }
        let arguments = arguments(&tag);
        self.seen.insert(tag.clone());
        self.found.push(CommandOccurrence {
            tag,
            line,
            arguments,
        });
    }
}

fn split_arguments(tag: &str) -> Vec<Argument> {
    split_command(tag).map(|(_, args)| args).unwrap_or_default()
}

/// Find every distinct invocation of the commands matched by `pattern`.
///
/// Identical raw tags are reported once. An argument that never closes
/// before the last line is dropped.
pub fn find_command_arguments(lines: &[SourceLine], pattern: &CommandPattern) -> Vec<CommandOccurrence> {
    let mut collector = Collector {
        seen: HashSet::new(),
        found: Vec::new(),
    };
    let mut pending: Option<(PendingSpan, usize)> = None;

    for line in lines {
        let content = line.content.as_str();

        if let Some((span, line_number)) = pending.take() {
            match span.resume(content) {
                Resume::Done { text, end } => match scan_groups(content, end) {
                    GroupsOutcome::End(stop) => {
                        let tag = format!("{text}{}", &content[end..stop]);
                        collector.push(tag, line_number, split_arguments);
                    }
                    GroupsOutcome::Unclosed { delimiter, balance } => {
                        let text = format!("{text}{}", &content[end..]);
                        pending = Some((PendingSpan::new(delimiter, balance, text), line_number));
                    }
                },
                Resume::Continue(next) => pending = Some((next, line_number)),
            }
        }

        for caps in pattern.regex.captures_iter(content) {
            let (Some(whole), Some(start)) = (caps.get(0), caps.name("start")) else {
                continue;
            };

            if pattern.single {
                let delimiter = start.as_str().chars().next().and_then(Delimiter::from_open);
                let argument = caps.name("content").map(|c| c.as_str());
                if let (Some(delimiter), Some(argument)) = (delimiter, argument) {
                    collector.push(whole.as_str().to_string(), line.line_number, |_| {
                        vec![Argument::new(delimiter, argument)]
                    });
                }
                continue;
            }

            match scan_groups(content, start.start()) {
                GroupsOutcome::End(stop) => {
                    let tag = content[whole.start()..stop].to_string();
                    collector.push(tag, line.line_number, split_arguments);
                }
                GroupsOutcome::Unclosed { delimiter, balance } => {
                    let span = PendingSpan::new(delimiter, balance, &content[whole.start()..]);
                    pending = Some((span, line.line_number));
                }
            }
        }
    }

    if let Some((span, line_number)) = pending {
        log::debug!("dropping unclosed command from line {line_number}: {}", span.text);
    }
    collector.found
}

/// Split a raw tag like `\newcommand{\x}[1]{y}` into its name and arguments.
///
/// Whitespace between groups is allowed. Returns `None` if the text holds no
/// command name.
pub fn split_command(tag: &str) -> Option<(String, Vec<Argument>)> {
    let caps = RE_COMMAND_NAME.captures(tag)?;
    let name = caps.get(1)?;
    let mut offset = name.end();
    let mut arguments = Vec::new();

    while let Some(next) = RE_NEXT_GROUP.find(&tag[offset..]) {
        let open = offset + next.end() - 1;
        let Some(delimiter) = tag[open..].chars().next().and_then(Delimiter::from_open) else {
            break;
        };
        match scan_argument(tag, open, delimiter, 0) {
            ScanOutcome::End(end) => {
                arguments.push(Argument::new(delimiter, &tag[open + 1..end - 1]));
                offset = end;
            }
            _ => break,
        }
    }

    Some((name.as_str().to_string(), arguments))
}

/// Document class name and option from the first `\documentclass`
pub fn document_class(lines: &[SourceLine]) -> Option<(String, Option<String>)> {
    let occurrence = find_command_arguments(lines, &DOCUMENTCLASS).into_iter().next()?;
    let name = occurrence.first(Delimiter::Brace)?.to_string();
    let option = occurrence.first(Delimiter::Bracket).map(str::to_string);
    Some((name, option))
}

/// Package names from the last `{}` argument of every `\usepackage`
pub fn use_packages(lines: &[SourceLine]) -> Vec<String> {
    let mut packages = Vec::new();
    for occurrence in find_command_arguments(lines, &USEPACKAGE) {
        match occurrence.arguments.last() {
            Some(argument) if argument.delimiter == Delimiter::Brace => packages.extend(
                argument
                    .content
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            ),
            _ => log::warn!("usepackage without package list: {}", occurrence.tag),
        }
    }
    log::debug!("packages: {packages:?}");
    packages
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    pub count: usize,
    pub text: String,
}

fn is_word_boundary(c: Option<char>) -> bool {
    matches!(c, Some(c) if c != '\\' && c != '+' && !c.is_alphanumeric() && c != '_')
}

/// Word runs that do not continue a command name or a preceding word
fn word_groups(content: &str) -> Vec<Vec<&str>> {
    let mut groups = Vec::new();
    for run in RE_WORD_RUN.find_iter(content) {
        let mut previous = content[..run.start()].chars().next_back();
        let mut begin = None;
        for (offset, c) in run.as_str().char_indices() {
            if is_word_boundary(previous) {
                begin = Some(run.start() + offset);
                break;
            }
            previous = Some(c);
        }
        if let Some(begin) = begin {
            groups.push(content[begin..run.end()].split_whitespace().collect());
        }
    }
    groups
}

/// Count recurring phrases of `min_length..=max_length` words.
///
/// Windows stop at bounding words. Only phrases seen at least `min_count`
/// times are kept, most frequent first.
pub fn list_words(lines: &[SourceLine], settings: &PhraseSettings) -> Vec<Phrase> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let min_length = settings.min_length.max(1);

    for line in lines {
        for words in word_groups(&line.content) {
            if words.len() < settings.min_length {
                continue;
            }
            for i in 0..words.len() {
                let longest = (words.len() - i).min(settings.max_length);
                for j in min_length..=longest {
                    if settings.bounding_words.iter().any(|b| b == words[i + j - 1]) {
                        break;
                    }
                    let key = words[i..i + j].join(" ");
                    let count = counts.entry(key.clone()).or_insert(0);
                    if *count == 0 {
                        order.push(key);
                    }
                    *count += 1;
                }
            }
        }
    }

    let mut phrases: Vec<Phrase> = order
        .into_iter()
        .filter_map(|text| {
            let count = counts[&text];
            (count >= settings.min_count).then_some(Phrase { count, text })
        })
        .collect();
    phrases.sort_by(|a, b| b.count.cmp(&a.count));
    phrases
}
