//! Domain-specific error types and error handling utilities.
//!
//! This module defines [`TexSenseError`] which covers every failure that can
//! leave the core. It uses `thiserror` for ergonomic error definitions and
//! includes constructors for the common failure scenarios.
//!
//! # Public API
//! - [`TexSenseError`]: Main error enum covering all failure modes
//! - [`Result<T>`]: Type alias for `std::result::Result<T, TexSenseError>`
//!
//! # Error Categories
//! - **Sources**: Referenced `.tex`/`.bib` file missing
//! - **Cache**: Directory, read, write and parse failures
//! - **Compiler**: Missing executables, process launch failures, busy builds
//! - **Settings**: Unreadable settings or project files
//!
//! Parsing problems inside a file (unclosed arguments, broken bibliography
//! records, corrupted cache blobs) are recovered where they happen and never
//! show up here.

use std::path::PathBuf;
use thiserror::Error;

/// Domain-specific error types for texsense
#[derive(Error, Debug)]
pub enum TexSenseError {
    // Source errors
    #[error("File does not exist: {path}")]
    SourceMissing { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Cache errors
    #[error("Could not find cache directory")]
    CacheDirectoryNotFound,

    #[error("Failed to create cache directory '{path}': {source}")]
    CacheDirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize cache data: {source}")]
    CacheSerializationFailed { source: serde_json::Error },

    #[error("Failed to write cache file '{path}': {source}")]
    CacheWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove cache file '{path}': {source}")]
    CacheRemoveFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    // Compiler errors
    #[error("The command line tool \"{name}\" is not available on your path. Please check your settings.")]
    ExecutableNotFound { name: String },

    #[error("COULD NOT COMPILE! \"{command}\"")]
    CompilerFailure { command: String },

    #[error("A build is already running for '{path}'. Please wait or terminate the old one.")]
    BuildInProgress { path: PathBuf },

    #[error("'{path}' was generated for a partial build and cannot be compiled")]
    GeneratedSource { path: PathBuf },

    // Settings errors
    #[error("Failed to parse settings file '{path}': {source}")]
    SettingsParseFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    // Collaborators
    #[error("Remote bibliography '{name}' failed: {message}")]
    RemoteSource { name: String, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results using TexSenseError
pub type Result<T> = std::result::Result<T, TexSenseError>;

impl TexSenseError {
    /// Machine-readable status code reported next to the human message
    pub fn status_code(&self) -> i32 {
        match self {
            Self::SourceMissing { .. } => 2,
            Self::Io(_) => 4,
            Self::CacheDirectoryNotFound
            | Self::CacheDirectoryCreationFailed { .. }
            | Self::CacheSerializationFailed { .. }
            | Self::CacheWriteFailed { .. }
            | Self::CacheRemoveFailed { .. } => 5,
            Self::ExecutableNotFound { .. } => 6,
            Self::CompilerFailure { .. } => 7,
            Self::BuildInProgress { .. } => 8,
            Self::GeneratedSource { .. } => 9,
            Self::SettingsParseFailed { .. } => 10,
            Self::RemoteSource { .. } => 11,
            Self::Json(_) => 12,
        }
    }

    /// Create a source missing error
    pub fn source_missing(path: impl Into<PathBuf>) -> Self {
        Self::SourceMissing { path: path.into() }
    }

    /// Create a cache directory creation failed error
    pub fn cache_directory_creation_failed(
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::CacheDirectoryCreationFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a cache serialization failed error
    pub fn cache_serialization_failed(source: serde_json::Error) -> Self {
        Self::CacheSerializationFailed { source }
    }

    /// Create a cache write failed error
    pub fn cache_write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheWriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a cache remove failed error
    pub fn cache_remove_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheRemoveFailed {
            path: path.into(),
            source,
        }
    }

    /// Create an executable not found error
    pub fn executable_not_found(name: impl Into<String>) -> Self {
        Self::ExecutableNotFound { name: name.into() }
    }

    /// Create a compiler failure error
    pub fn compiler_failure(command: impl Into<String>) -> Self {
        Self::CompilerFailure {
            command: command.into(),
        }
    }

    /// Create a build in progress error
    pub fn build_in_progress(path: impl Into<PathBuf>) -> Self {
        Self::BuildInProgress { path: path.into() }
    }

    /// Create a settings parse failed error
    pub fn settings_parse_failed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::SettingsParseFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a remote source error
    pub fn remote_source(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteSource {
            name: name.into(),
            message: message.into(),
        }
    }
}
