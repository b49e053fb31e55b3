use crate::core::error::TexSenseError;
use std::path::PathBuf;

pub fn get_config_directory() -> Result<PathBuf, TexSenseError> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::home_dir().unwrap_or_default().join(".config")),
        "macos" => dirs::home_dir()
            .unwrap_or_default()
            .join("Library/Application Support"),
        _ => dirs::config_dir().ok_or(TexSenseError::CacheDirectoryNotFound)?,
    };

    Ok(base.join("texsense"))
}

pub fn get_cache_directory() -> Result<PathBuf, TexSenseError> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::home_dir().unwrap_or_default().join(".cache")),
        "macos" => dirs::home_dir().unwrap_or_default().join("Library/Caches"),
        _ => dirs::cache_dir().ok_or(TexSenseError::CacheDirectoryNotFound)?,
    };

    Ok(base.join("texsense"))
}

/// Directory holding job-named output directories
pub fn get_temp_directory() -> PathBuf {
    std::env::temp_dir().join("texsense")
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir().unwrap_or_default();
            home.join(rest.trim_start_matches(['/', '\\']))
        }
        None => PathBuf::from(path),
    }
}

/// Abbreviate the home directory to `~` for display
pub fn collapse_home(path: &std::path::Path) -> String {
    match dirs::home_dir() {
        Some(home) if !home.as_os_str().is_empty() => match path.strip_prefix(&home) {
            Ok(rest) => format!("~/{}", rest.display()),
            Err(_) => path.display().to_string(),
        },
        _ => path.display().to_string(),
    }
}
