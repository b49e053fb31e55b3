//! Index of installed LaTeX packages, classes and bibliography styles.

use crate::core::cache::PKG_CACHE;
use crate::core::config::Context;
use crate::core::error::Result;
use crate::core::process::{find_executable, search_path, CancelHandle, CommandSpec, ProcessRunner};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Contents of `pkg.cache`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIndex {
    #[serde(default)]
    pub bst: Vec<String>,
    #[serde(default)]
    pub cls: Vec<String>,
    #[serde(default)]
    pub sty: Vec<String>,
}

/// Root directories from `kpsewhich --expand-var $TEXMF` output
pub fn texmf_roots(output: &str) -> Vec<PathBuf> {
    output
        .trim_matches(|c| matches!(c, '{' | '}' | '\r' | '\n'))
        .split(',')
        .map(|item| item.trim().trim_start_matches('!'))
        .filter(|item| !item.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl PackageIndex {
    /// Walk `roots` for `.bst`, `.cls` and `.sty` files; hidden files skipped
    pub fn scan(roots: &[PathBuf]) -> Self {
        let (mut bst, mut cls, mut sty) = (BTreeSet::new(), BTreeSet::new(), BTreeSet::new());

        for root in roots.iter().filter(|r| r.is_dir()) {
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if name.starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                    continue;
                };
                match path.extension().and_then(|e| e.to_str()) {
                    Some("bst") => bst.insert(stem),
                    Some("cls") => cls.insert(stem),
                    Some("sty") => sty.insert(stem),
                    _ => false,
                };
            }
        }

        Self {
            bst: bst.into_iter().collect(),
            cls: cls.into_iter().collect(),
            sty: sty.into_iter().collect(),
        }
    }

    /// Ask `kpsewhich` for the TeX trees and scan them
    pub fn discover(ctx: &Context, runner: &dyn ProcessRunner) -> Result<Self> {
        let kpsewhich = find_executable(&ctx.settings.build, "kpsewhich")?;
        let mut spec = CommandSpec::new(
            kpsewhich,
            vec!["--expand-var".to_string(), "$TEXMF".to_string()],
            std::env::temp_dir(),
        );
        spec.search_path = Some(search_path(&ctx.settings.build));

        let output = runner.run(&spec, &CancelHandle::default())?;
        let roots = texmf_roots(&output.stdout);
        log::debug!("TEXMF roots: {roots:?}");
        Ok(Self::scan(&roots))
    }

    /// The cached index while fresh, else a new discovery stored with a
    /// fresh timestamp
    pub fn load(ctx: &Context, runner: &dyn ProcessRunner, force_refresh: bool) -> Result<Self> {
        let hours = ctx.settings.cache_hours("pkg");
        if hours > 0 && !force_refresh && !ctx.cache.is_outdated(PKG_CACHE, hours) {
            let blob = ctx.cache.get(PKG_CACHE);
            match serde_json::from_value(Value::Object(blob.data)) {
                Ok(index) => return Ok(index),
                Err(e) => log::warn!("Ignoring cached package index: {e}"),
            }
        }

        let index = Self::discover(ctx, runner)?;
        if hours > 0 {
            if let Value::Object(data) = serde_json::to_value(&index)? {
                ctx.cache.set(PKG_CACHE, data, true);
            }
        }
        Ok(index)
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.sty.iter().any(|s| s == name)
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.cls.iter().any(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.bst.is_empty() && self.cls.is_empty() && self.sty.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::DerivedDataCache;
    use crate::core::config::Settings;
    use crate::core::process::ProcessOutput;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FixedOutput(String);

    impl ProcessRunner for FixedOutput {
        fn run(&self, _: &CommandSpec, _: &CancelHandle) -> Result<ProcessOutput> {
            Ok(ProcessOutput {
                code: Some(0),
                stdout: self.0.clone(),
                ..Default::default()
            })
        }
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in ["tex/latex/amsmath/amsmath.sty", "tex/latex/base/article.cls", "bibtex/bst/plain.bst", "tex/latex/base/.hidden.sty", "doc/readme.txt"] {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        dir
    }

    #[test]
    fn test_texmf_roots() {
        assert_eq!(
            texmf_roots("{/home/u/texmf,!!/usr/share/texmf,}\n"),
            vec![PathBuf::from("/home/u/texmf"), PathBuf::from("/usr/share/texmf")]
        );
    }

    #[test]
    fn test_scan() {
        let dir = tree();
        let index = PackageIndex::scan(&[dir.path().to_path_buf(), PathBuf::from("/nonexistent")]);
        assert_eq!(index.sty, vec!["amsmath"]);
        assert_eq!(index.cls, vec!["article"]);
        assert_eq!(index.bst, vec!["plain"]);
        assert!(index.has_package("amsmath"));
        assert!(index.has_class("article"));
    }

    #[test]
    fn test_load_uses_fresh_cache() {
        let dir = tree();
        let bin = TempDir::new().unwrap();
        fs::write(bin.path().join("kpsewhich"), "").unwrap();

        let mut settings = Settings::default();
        settings.build.path = vec![bin.path().to_path_buf()];
        let ctx = Context::new(Arc::new(DerivedDataCache::in_memory()), settings);
        let runner = FixedOutput(format!("{{{}}}", dir.path().display()));

        let index = PackageIndex::load(&ctx, &runner, false).unwrap();
        assert_eq!(index.sty, vec!["amsmath"]);

        let empty = FixedOutput(String::new());
        assert_eq!(PackageIndex::load(&ctx, &empty, false).unwrap(), index);
        assert!(PackageIndex::load(&ctx, &empty, true).unwrap().is_empty());
    }
}
