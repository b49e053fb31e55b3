//! Lexical path helpers.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Append `extension` to a name that has none
pub fn with_default_extension(name: &str, extension: &str) -> String {
    if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{name}{extension}")
    }
}

/// Append `extension` unless the name already ends with it
pub fn add_extension(name: &str, extension: &str) -> String {
    if name.ends_with(extension) {
        name.to_string()
    } else {
        format!("{name}{extension}")
    }
}

pub fn remove_extension<'a>(name: &'a str, extension: &str) -> &'a str {
    name.strip_suffix(extension).unwrap_or(name)
}

/// `path` relative to `base`, with `/` separators
pub fn relative_to(path: &Path, base: &Path) -> String {
    let path: Vec<_> = normalize(path).components().map(|c| c.as_os_str().to_owned()).collect();
    let base: Vec<_> = normalize(base).components().map(|c| c.as_os_str().to_owned()).collect();
    let common = path.iter().zip(&base).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = vec!["..".to_string(); base.len() - common];
    parts.extend(path[common..].iter().map(|p| p.to_string_lossy().into_owned()));
    parts.join("/")
}

/// File stem as a string, empty when the path has none
pub fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parent directory, `.` for bare file names
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
