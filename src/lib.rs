//! texsense - structural understanding of LaTeX documents.
//!
//! This library extracts commands, citations and document structure from
//! TeX sources, tokenizes BibTeX files, parses compiler logs into
//! diagnostics and keeps the derived data in a persistent cache. A thin CLI
//! in `main.rs` drives it.
//!
//! # Public API
//! The main public interface is re-exported from the [`core`] module, which provides:
//! - Argument scanning and command extraction
//! - The TeX document model and bibliography files
//! - The derived-data cache and its maintenance
//! - Compiler orchestration and log parsing
//! - Error handling and result types

pub mod commands;
pub mod core;

// Re-export the core public API for external users
pub use core::{
    BibEntry,
    BibFile,
    // Cache
    CacheStore,
    Category,
    Compiler,
    // Configuration
    Context,
    Diagnostic,
    DiagnosticKind,
    // Build diagnostics
    Diagnostics,
    DerivedDataCache,
    LogParser,
    Result,
    Settings,
    // Document model
    TexFile,
    // Error handling
    TexSenseError,
};
