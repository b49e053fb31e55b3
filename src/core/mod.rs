//! Core functionality for texsense.
//!
//! This module provides the building blocks for reading LaTeX sources,
//! bibliography files and compiler logs, the derived-data cache, and the
//! compiler orchestration built on top of them.

pub mod bib;
pub mod bib_file;
pub mod bib_tokenizer;
pub mod cache;
pub mod colors;
pub mod command_init;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod dirs;
pub mod error;
pub mod extractor;
pub mod log_parser;
pub mod maintenance;
pub mod output;
pub mod packages;
pub mod paths;
pub mod process;
pub mod remote;
pub mod scanner;
pub mod source;
pub mod source_check;
pub mod tex_data;
pub mod tex_file;

// === Error handling ===
// Core error type and result alias used throughout the crate
pub use error::{Result, TexSenseError};

// === Configuration ===
// Settings, project overrides and the injected context
pub use command_init::{CommandInit, CommandOptions};
pub use config::{Context, OnRunning, OutputDirectoryMode, ProjectSettings, Settings};

// === Scanning ===
// Balanced-argument scanning and command extraction
pub use extractor::{Argument, CommandOccurrence, CommandPattern, Phrase};
pub use scanner::{scan_argument, Delimiter, PendingSpan, Resume, ScanOutcome};
pub use source::{read_source, SourceLine, SourceText, TexOptions};

// === Documents ===
// TeX document model and bibliography files
pub use bib::BibEntry;
pub use bib_file::BibFile;
pub use tex_data::{Category, DocumentClass, Occurrence, TexData};
pub use tex_file::TexFile;

// === Cache ===
// Derived-data cache and its maintenance
pub use cache::{CacheBlob, CacheStore, DerivedDataCache};
pub use packages::PackageIndex;
pub use remote::{RemoteLibrary, RemoteSource, RemoteStatus};

// === Building ===
// Compiler orchestration, log parsing and diagnostics
pub use compiler::{BuildHandle, BuildMode, BuildOutcome, Compiler};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, DiagnosticsSink, UserNotifier};
pub use log_parser::LogParser;
pub use process::{ProcessRunner, SystemRunner};

// === Output formatting ===
// Unified output formatting for consistent CLI presentation
pub use output::{print_error, print_info, print_section_header, print_success, ConsoleNotifier, ConsoleSink};
