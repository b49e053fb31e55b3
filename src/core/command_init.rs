//! Centralized initialization for CLI commands.
//!
//! Every command needs the same [`Context`]: settings from the config
//! directory, the derived-data cache and, when one is found, the project
//! settings of the file it works on.
//!
//! # Initialization Steps
//! 1. **Settings**: Load `settings.json`, creating it with defaults
//! 2. **Cache**: Disk-backed below the cache directory, or in memory with `--no-cache`
//! 3. **Project**: An explicit project file, else the nearest
//!    `*.texsense-project` in the target's directory or its ancestors

use crate::core::cache::{CacheStore, DerivedDataCache};
use crate::core::config::{Context, ProjectSettings, Settings};
use crate::core::dirs::get_cache_directory;
use crate::core::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const PROJECT_EXTENSION: &str = "texsense-project";

/// Options shared by all commands
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub no_cache: bool,
    pub project: Option<PathBuf>,
}

/// Nearest project file at or above `start`
pub fn find_project_file(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == PROJECT_EXTENSION))
            .collect();
        found.sort();
        found.into_iter().next()
    })
}

pub struct CommandInit;

impl CommandInit {
    /// Build the context for a command working on `target`
    pub fn initialize(options: &CommandOptions, target: Option<&Path>) -> Result<Context> {
        let settings = Settings::load_or_create()?;

        let cache: Arc<dyn CacheStore> = if options.no_cache {
            log::debug!("Using an in-memory cache");
            Arc::new(DerivedDataCache::in_memory())
        } else {
            let dir = get_cache_directory()?;
            log::debug!("Cache directory: {}", dir.display());
            Arc::new(DerivedDataCache::new(
                Some(dir),
                Duration::from_secs(settings.cache_save_delay_secs),
            ))
        };

        let project_file = options.project.clone().or_else(|| {
            let start = target?.parent()?;
            let start = if start.as_os_str().is_empty() { Path::new(".") } else { start };
            find_project_file(start)
        });

        let ctx = Context::new(cache, settings);
        match project_file {
            Some(path) => {
                log::debug!("Project settings: {}", path.display());
                Ok(ctx.with_project(ProjectSettings::load(&path)?))
            }
            None => Ok(ctx),
        }
    }
}
