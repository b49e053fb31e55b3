//! Structural facts extracted from one TeX file.

use crate::core::config::PhraseSettings;
use crate::core::extractor::{document_class, find_command_arguments, list_words, use_packages, CommandOccurrence, CommandPattern, Phrase};
use crate::core::source::{SourceText, TexOptions};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Acronym definitions
    Ac,
    Bibitem,
    Bibliography,
    Cite,
    Input,
    Label,
    Newcommand,
    Newenvironment,
    Packages,
    Ref,
    Words,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Self::Ac,
        Self::Bibitem,
        Self::Bibliography,
        Self::Cite,
        Self::Input,
        Self::Label,
        Self::Newcommand,
        Self::Newenvironment,
        Self::Packages,
        Self::Ref,
        Self::Words,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ac => "ac",
            Self::Bibitem => "bibitem",
            Self::Bibliography => "bibliography",
            Self::Cite => "cite",
            Self::Input => "input",
            Self::Label => "label",
            Self::Newcommand => "newcommand",
            Self::Newenvironment => "newenvironment",
            Self::Packages => "packages",
            Self::Ref => "ref",
            Self::Words => "words",
        }
    }

    /// Command matcher for categories backed by command invocations
    pub fn pattern(self) -> Option<&'static CommandPattern> {
        match self {
            Self::Ac => Some(&AC),
            Self::Bibitem => Some(&BIBITEM),
            Self::Bibliography => Some(&BIBLIOGRAPHY),
            Self::Cite => Some(&CITE),
            Self::Input => Some(&INPUT),
            Self::Label => Some(&LABEL),
            Self::Newcommand => Some(&NEWCOMMAND),
            Self::Newenvironment => Some(&NEWENVIRONMENT),
            Self::Ref => Some(&REF),
            Self::Packages | Self::Words => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

lazy_static! {
    static ref AC: CommandPattern = CommandPattern::full(r"(new)?acro(def)?(indefinite|plural)?").unwrap();
    static ref BIBITEM: CommandPattern = CommandPattern::full("bibitem").unwrap();
    static ref BIBLIOGRAPHY: CommandPattern =
        CommandPattern::full("(bibliography|addbibresource|addglobalbib|addsectionbib)").unwrap();
    static ref CITE: CommandPattern = CommandPattern::single(r"(no)?cite\w*").unwrap();
    static ref INPUT: CommandPattern = CommandPattern::single(r"(input|include|subfile)\**").unwrap();
    static ref LABEL: CommandPattern = CommandPattern::full("(line)?label").unwrap();
    static ref NEWCOMMAND: CommandPattern = CommandPattern::full("(re)?newcommand").unwrap();
    static ref NEWENVIRONMENT: CommandPattern = CommandPattern::full("(re)?newenvironment").unwrap();
    static ref REF: CommandPattern = CommandPattern::single(r"\w*ref").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentClass {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
}

/// One item of a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Occurrence {
    Command(CommandOccurrence),
    Package(String),
    Phrase(Phrase),
}

impl Occurrence {
    pub fn as_command(&self) -> Option<&CommandOccurrence> {
        match self {
            Self::Command(command) => Some(command),
            _ => None,
        }
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(c) => write!(f, "{}: {}", c.line, c.tag),
            Self::Package(name) => f.write_str(name),
            Self::Phrase(p) => write!(f, "{}: {}", p.count, p.text),
        }
    }
}

/// Parsed content of one file, as stored in `tex.cache`.
///
/// Absent categories mean nothing was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TexData {
    /// Modification time in seconds since the epoch when parsed
    #[serde(default)]
    pub mtime: u64,
    #[serde(default)]
    pub options: TexOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentclass: Option<DocumentClass>,
    #[serde(default)]
    pub commands: BTreeMap<Category, Vec<CommandOccurrence>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Phrase>,
}

impl TexData {
    pub fn extract(source: &SourceText, phrases: &PhraseSettings) -> Self {
        let mut data = TexData {
            options: TexOptions::parse(&source.option_lines),
            documentclass: document_class(&source.lines).map(|(name, option)| DocumentClass { name, option }),
            packages: use_packages(&source.lines),
            ..Default::default()
        };

        for category in Category::ALL {
            if let Some(pattern) = category.pattern() {
                let found = find_command_arguments(&source.lines, pattern);
                if !found.is_empty() {
                    data.commands.insert(category, found);
                }
            }
        }

        if phrases.enabled {
            data.words = list_words(&source.lines, phrases);
        }
        data
    }

    pub fn commands(&self, category: Category) -> &[CommandOccurrence] {
        self.commands.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    /// Items of any category, in file order
    pub fn occurrences(&self, category: Category) -> Vec<Occurrence> {
        match category {
            Category::Packages => self.packages.iter().cloned().map(Occurrence::Package).collect(),
            Category::Words => self.words.iter().cloned().map(Occurrence::Phrase).collect(),
            _ => self.commands(category).iter().cloned().map(Occurrence::Command).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::parse_source;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = r"% !TEX root = main.tex
\documentclass[11pt]{article}
\usepackage{biblatex}
\acro{CPU}{central processing unit}
\begin{document}
\section{Intro}\label{sec:intro}
See \ref{sec:intro} and \cite{knuth84}.
\input{chapters/one}
\addbibresource{refs.bib}
\end{document}
";

    #[test]
    fn test_extract_categories() {
        let data = TexData::extract(&parse_source(DOCUMENT, true), &PhraseSettings::default());

        assert_eq!(data.options.root.as_deref(), Some("main.tex"));
        assert_eq!(
            data.documentclass,
            Some(DocumentClass {
                name: "article".to_string(),
                option: Some("11pt".to_string())
            })
        );
        assert_eq!(data.packages, vec!["biblatex".to_string()]);
        assert_eq!(data.commands(Category::Label)[0].tag, r"\label{sec:intro}");
        assert_eq!(data.commands(Category::Ref)[0].line, 7);
        assert_eq!(data.commands(Category::Cite)[0].tag, r"\cite{knuth84}");
        assert_eq!(data.commands(Category::Input)[0].arguments[0].content, "chapters/one");
        assert_eq!(data.commands(Category::Bibliography)[0].arguments[0].content, "refs.bib");
        assert!(data.commands.contains_key(&Category::Ac));
        assert!(!data.commands.contains_key(&Category::Newcommand));
    }

    #[test]
    fn test_empty_categories_are_absent_after_round_trip() {
        let data = TexData::extract(&parse_source("plain text only", true), &PhraseSettings::default());
        let json = serde_json::to_value(&data).unwrap();
        assert!(json["commands"].as_object().unwrap().is_empty());
        assert!(json.get("packages").is_none());

        let back: TexData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_category_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!("chapter".parse::<Category>().is_err());
    }
}
