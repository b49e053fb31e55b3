//! Cache-backed model of one TeX source file and its document tree.
//!
//! # Public API
//! - [`TexFile::run`]: adopt the cached parse or parse the file
//! - [`TexFile::root_file_path`]: the file the compiler is run on
//! - [`TexFile::get`]: category occurrences, optionally over the `\input` tree
//! - [`TexFile::bibliography`]: linked `.bib` files, parsed on the way
//! - [`TexFile::output_directory`]: where build products go
//!
//! Root resolution takes at most one hop: an explicit `root` directive, else
//! the parent named by the `subfiles` class option, else the file itself.
//! A project-level `root` overrides all three.

use crate::core::bib_file::BibFile;
use crate::core::cache::{load_entry, store_entry, TEX_CACHE};
use crate::core::config::{Context, OutputDirectoryMode};
use crate::core::dirs::get_temp_directory;
use crate::core::error::{Result, TexSenseError};
use crate::core::extractor::Phrase;
use crate::core::maintenance::refresh_tex_cache;
use crate::core::paths::{add_extension, normalize, parent_dir, stem, with_default_extension};
use crate::core::scanner::Delimiter;
use crate::core::source::read_source;
use crate::core::tex_data::{Category, DocumentClass, Occurrence, TexData};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Modification time in whole seconds, `0` if unavailable
pub fn modification_time(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Absolute, lexically normalized form of `path`
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_default();
        normalize(&cwd.join(path))
    }
}

/// Parse a file from disk, ignoring the cache
pub fn parse_tex_file(ctx: &Context, path: &Path) -> Result<TexData> {
    let source = read_source(path, true)?;
    let mut data = TexData::extract(&source, &ctx.settings.phrases);
    data.mtime = modification_time(path);
    log::debug!("parsed {}", path.display());
    Ok(data)
}

pub struct TexFile {
    ctx: Context,
    path: PathBuf,
    data: Option<TexData>,
}

impl TexFile {
    pub fn new(ctx: &Context, path: impl AsRef<Path>) -> Self {
        Self {
            ctx: ctx.clone(),
            path: absolute(path.as_ref()),
            data: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> PathBuf {
        parent_dir(&self.path)
    }

    pub fn stem(&self) -> String {
        stem(&self.path)
    }

    /// Lowercased extension including the dot
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }

    pub fn data(&self) -> Option<&TexData> {
        self.data.as_ref()
    }

    fn cache_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Load the structural data of this file.
    ///
    /// With `use_cache`, a cached entry whose recorded modification time
    /// matches the file is adopted unless `force_refresh` is set, and a
    /// fresh parse is merged back into the cache. An outdated category is
    /// refreshed as a whole first.
    pub fn run(&mut self, use_cache: bool, force_refresh: bool) -> Result<&TexData> {
        if !self.path.is_file() {
            self.data = None;
            return Err(TexSenseError::source_missing(&self.path));
        }

        let hours = self.ctx.settings.cache_hours("tex");
        let caching = use_cache && hours > 0;
        let key = self.cache_key();

        if caching && !force_refresh {
            if self.ctx.cache.is_outdated(TEX_CACHE, hours) {
                refresh_tex_cache(&self.ctx, true);
            }
            let cached: Option<TexData> = load_entry(self.ctx.cache.as_ref(), TEX_CACHE, &key);
            match cached {
                Some(data) if data.mtime == modification_time(&self.path) => {
                    log::debug!("cache hit: {key}");
                    return Ok(self.data.insert(data));
                }
                Some(_) => log::debug!("cache entry out of date: {key}"),
                None => log::debug!("cache miss: {key}"),
            }
        }

        let data = parse_tex_file(&self.ctx, &self.path)?;
        if caching {
            store_entry(self.ctx.cache.as_ref(), TEX_CACHE, &key, &data);
        }
        Ok(self.data.insert(data))
    }

    /// Parsed data, or empty data for a file that cannot be read
    fn ensure(&mut self) -> &TexData {
        if self.data.is_none() {
            if let Err(e) = self.run(true, false).map(|_| ()) {
                log::debug!("{e}");
            }
        }
        self.data.get_or_insert_with(TexData::default)
    }

    pub fn root_file_path(&mut self) -> PathBuf {
        let dir = self.dir();
        let default_extension = self.ctx.settings.default_tex_extension.clone();
        let (root, class) = {
            let data = self.ensure();
            (data.options.root.clone(), data.documentclass.clone())
        };

        if let Some(root) = root {
            let candidate = normalize(&dir.join(with_default_extension(&root, &default_extension)));
            if candidate.is_file() {
                return self.ctx.project_root(candidate);
            }
        }

        if let Some(DocumentClass { name, option: Some(parent) }) = class {
            if name == "subfiles" {
                let candidate = normalize(&dir.join(parent));
                if candidate.is_file() {
                    return self.ctx.project_root(candidate);
                }
            }
        }

        self.ctx.project_root(self.path.clone())
    }

    pub fn root_file(&mut self) -> TexFile {
        let root = self.root_file_path();
        if root == self.path {
            TexFile {
                ctx: self.ctx.clone(),
                path: root,
                data: self.data.clone(),
            }
        } else {
            TexFile::new(&self.ctx, root)
        }
    }

    pub fn is_root(&mut self) -> bool {
        self.root_file_path() == self.path
    }

    /// Occurrences of `category` tagged with their file.
    ///
    /// Without `walk` only this file is consulted. With `walk` the tree is
    /// collected from the root file down through every `\input`,
    /// `\include` and `\subfile`; missing files are skipped and each file is
    /// visited once.
    pub fn get(&mut self, category: Category, walk: bool) -> Vec<(PathBuf, Occurrence)> {
        if !walk {
            let path = self.path.clone();
            return self
                .ensure()
                .occurrences(category)
                .into_iter()
                .map(|o| (path.clone(), o))
                .collect();
        }
        let mut root = self.root_file();
        root.get_tree(category)
    }

    /// Like [`TexFile::get`] with `walk`, but rooted at this file
    pub fn get_tree(&mut self, category: Category) -> Vec<(PathBuf, Occurrence)> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();
        let base = self.root_file_path();
        let base_dir = parent_dir(&base);
        self.walk(&base_dir, &mut visited, &mut |file, data| {
            found.extend(data.occurrences(category).into_iter().map(|o| (file.to_path_buf(), o)));
        });
        found
    }

    fn walk(&mut self, base_dir: &Path, visited: &mut HashSet<PathBuf>, visit: &mut dyn FnMut(&Path, &TexData)) {
        if !visited.insert(self.path.clone()) {
            log::debug!("already visited {}", self.path.display());
            return;
        }
        if let Err(e) = self.run(true, false).map(|_| ()) {
            log::debug!("skipping {}: {e}", self.path.display());
            return;
        }
        let Some(data) = self.data.clone() else {
            return;
        };
        visit(&self.path, &data);

        let extension = self.ctx.settings.default_tex_extension.clone();
        for input in data.commands(Category::Input) {
            let Some(name) = input.arguments.first().map(|a| a.content.trim()) else {
                continue;
            };
            let child = normalize(&base_dir.join(with_default_extension(name, &extension)));
            TexFile::new(&self.ctx, child).walk(base_dir, visited, visit);
        }
    }

    /// Every file of the document tree, root first
    pub fn files(&mut self) -> Vec<PathBuf> {
        let mut root = self.root_file();
        let base_dir = root.dir();
        let mut files = Vec::new();
        root.walk(&base_dir, &mut HashSet::new(), &mut |file, _| files.push(file.to_path_buf()));
        files
    }

    /// Phrase counts summed over the tree, most frequent first
    pub fn words(&mut self, walk: bool) -> Vec<Phrase> {
        let mut order = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for (_, occurrence) in self.get(Category::Words, walk) {
            if let Occurrence::Phrase(phrase) = occurrence {
                let count = counts.entry(phrase.text.clone()).or_insert(0);
                if *count == 0 {
                    order.push(phrase.text);
                }
                *count += phrase.count;
            }
        }
        let mut phrases: Vec<Phrase> = order
            .into_iter()
            .map(|text| Phrase {
                count: counts[&text],
                text,
            })
            .collect();
        phrases.sort_by(|a, b| b.count.cmp(&a.count));
        phrases
    }

    /// Linked bibliography files, resolved against the root directory.
    ///
    /// Each file is parsed into the bibliography cache as a side effect.
    pub fn bibliography(&mut self) -> Vec<PathBuf> {
        let root_dir = parent_dir(&self.root_file_path());
        let extension = self.ctx.settings.default_bib_extension.clone();
        let mut paths: Vec<PathBuf> = Vec::new();

        for (_, occurrence) in self.get(Category::Bibliography, true) {
            let Some(list) = occurrence.as_command().and_then(|c| c.first(Delimiter::Brace)) else {
                continue;
            };
            for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let path = normalize(&root_dir.join(with_default_extension(name, &extension)));
                if paths.contains(&path) {
                    continue;
                }
                if let Err(e) = BibFile::new(&self.ctx, &path).run(true, false) {
                    log::debug!("{e}");
                }
                paths.push(path);
            }
        }
        paths
    }

    /// Document class of this file, or of its root with `root`
    pub fn documentclass(&mut self, root: bool) -> Option<DocumentClass> {
        if root {
            self.root_file().ensure().documentclass.clone()
        } else {
            self.ensure().documentclass.clone()
        }
    }

    /// Option lookup: this file, then the root file, then the project
    pub fn get_option(&mut self, key: &str, fallback: Option<String>) -> Option<String> {
        if key == "root" {
            return Some(self.root_file_path().to_string_lossy().into_owned());
        }
        if let Some(value) = self.ensure().options.get(key).map(str::to_string) {
            return self.ctx.project_option(key).or(Some(value));
        }
        if !self.is_root() {
            return self.root_file().get_option(key, fallback);
        }
        self.ctx.project_option(key).or(fallback)
    }

    /// `pdf` option or file stem, spaces replaced, with `.pdf`
    pub fn pdf_file_name(&mut self) -> String {
        let name = self
            .get_option("pdf", Some(self.stem()))
            .unwrap_or_else(|| self.stem());
        add_extension(&name.replace(' ', "_"), ".pdf")
    }

    /// Directory for build products, created on demand.
    ///
    /// Falls back to the root directory when it cannot be created.
    pub fn output_directory(&mut self, sub_directory: Option<&str>) -> PathBuf {
        let mut root = self.root_file();
        let root_dir = root.dir();
        if !self.ctx.settings.output_directory {
            return root_dir;
        }

        let pdf_name = root.pdf_file_name();
        let job = pdf_name.strip_suffix(".pdf").unwrap_or(&pdf_name);

        let mut dir = match self.ctx.settings.output_directory_mode {
            OutputDirectoryMode::Flat => root_dir.join("Output"),
            OutputDirectoryMode::Temp => {
                let hash = format!("{:x}", md5::compute(root_dir.to_string_lossy().as_bytes()));
                get_temp_directory().join(hash).join(job)
            }
        };
        if let Some(sub) = sub_directory {
            dir = dir.join(sub);
        }

        match std::fs::create_dir_all(&dir) {
            Ok(()) => dir,
            Err(e) => {
                log::warn!("Failed to create output directory '{}': {e}", dir.display());
                root_dir
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{CacheStore, DerivedDataCache};
    use crate::core::config::{ProjectSettings, Settings};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context() -> Context {
        Context::new(Arc::new(DerivedDataCache::in_memory()), Settings::default())
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_run_missing_file() {
        let ctx = context();
        let mut file = TexFile::new(&ctx, "/nonexistent/main.tex");
        assert!(matches!(file.run(true, false), Err(TexSenseError::SourceMissing { .. })));
    }

    #[test]
    fn test_run_adopts_cache_entry_with_same_mtime() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "main.tex", "\\label{first}\n");
        let ctx = context();

        TexFile::new(&ctx, &path).run(true, false).unwrap();
        assert!(ctx.cache.entry(TEX_CACHE, &path.to_string_lossy()).is_some());
        assert!(!ctx.cache.is_outdated(TEX_CACHE, 24));

        let mut cached: TexData = load_entry(ctx.cache.as_ref(), TEX_CACHE, &path.to_string_lossy()).unwrap();
        cached.commands.clear();
        store_entry(ctx.cache.as_ref(), TEX_CACHE, &path.to_string_lossy(), &cached);

        let mut file = TexFile::new(&ctx, &path);
        assert!(file.run(true, false).unwrap().commands.is_empty());
        assert!(!file.run(true, true).unwrap().commands.is_empty());
    }

    #[test]
    fn test_root_from_directive() {
        let dir = TempDir::new().unwrap();
        let main = write(dir.path(), "main.tex", "\\documentclass{book}\n");
        let chapter = write(dir.path(), "chapters/one.tex", "% -*- root: ../main -*-\n\\section{One}\n");

        let ctx = context();
        assert_eq!(TexFile::new(&ctx, &chapter).root_file_path(), main);
    }

    #[test]
    fn test_root_directive_to_missing_file_falls_back_to_self() {
        let dir = TempDir::new().unwrap();
        let chapter = write(dir.path(), "one.tex", "% !TEX root = nothere.tex\n");
        let ctx = context();
        assert_eq!(TexFile::new(&ctx, &chapter).root_file_path(), chapter);
    }

    #[test]
    fn test_root_from_subfiles_class_takes_one_hop() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "top.tex", "\\documentclass{article}\n");
        let middle = write(dir.path(), "middle.tex", "\\documentclass[top.tex]{subfiles}\n");
        let leaf = write(dir.path(), "leaf.tex", "\\documentclass[middle.tex]{subfiles}\n");

        let ctx = context();
        assert_eq!(TexFile::new(&ctx, &leaf).root_file_path(), middle);
    }

    #[test]
    fn test_root_resolution_terminates_on_mutual_directives() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.tex", "% !TEX root = b.tex\n");
        let b = write(dir.path(), "b.tex", "% !TEX root = a.tex\n");

        let ctx = context();
        assert_eq!(TexFile::new(&ctx, &a).root_file_path(), b);
        assert_eq!(TexFile::new(&ctx, &b).root_file_path(), a);
    }

    #[test]
    fn test_project_root_overrides() {
        let dir = TempDir::new().unwrap();
        let thesis = write(dir.path(), "thesis.tex", "");
        let chapter = write(dir.path(), "chapter.tex", "");
        let project_file = write(dir.path(), "thesis.project", r#"{"options": {"root": "thesis"}}"#);

        let ctx = context().with_project(ProjectSettings::load(&project_file).unwrap());
        assert_eq!(TexFile::new(&ctx, &chapter).root_file_path(), thesis);
    }

    #[test]
    fn test_walk_collects_tree_and_skips_missing() {
        let dir = TempDir::new().unwrap();
        let main = write(
            dir.path(),
            "main.tex",
            "\\label{main}\n\\input{chapters/one}\n\\include{missing}\n\\input{chapters/two.tex}\n",
        );
        let one = write(dir.path(), "chapters/one.tex", "% !TEX root = ../main.tex\n\\label{one}\n\\input{chapters/nested}\n");
        let nested = write(dir.path(), "chapters/nested.tex", "\\label{nested}\n");
        let two = write(dir.path(), "chapters/two.tex", "\\label{two}\n\\input{main}\n");

        let ctx = context();
        let labels: Vec<(PathBuf, String)> = TexFile::new(&ctx, &one)
            .get(Category::Label, true)
            .into_iter()
            .map(|(path, o)| (path, o.as_command().unwrap().arguments[0].content.clone()))
            .collect();

        assert_eq!(
            labels,
            vec![
                (main.clone(), "main".to_string()),
                (one.clone(), "one".to_string()),
                (nested.clone(), "nested".to_string()),
                (two.clone(), "two".to_string()),
            ]
        );
        assert_eq!(TexFile::new(&ctx, &two).files(), vec![two.clone(), main.clone(), one, nested]);

        let own: Vec<_> = TexFile::new(&ctx, &main).get(Category::Label, false);
        assert_eq!(own.len(), 1);
    }

    #[test]
    fn test_bibliography_resolution() {
        let dir = TempDir::new().unwrap();
        let main = write(dir.path(), "main.tex", "\\bibliography{refs,extra/more.bib, refs}\n");
        write(dir.path(), "refs.bib", "@Book{a,\n title = {A}\n}\n");

        let ctx = context();
        let bibs = TexFile::new(&ctx, &main).bibliography();
        assert_eq!(bibs, vec![dir.path().join("refs.bib"), dir.path().join("extra/more.bib")]);
        assert!(ctx.cache.entry(crate::core::cache::BIB_CACHE, &dir.path().join("refs.bib").to_string_lossy()).is_some());
    }

    #[test]
    fn test_options_and_pdf_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "main.tex", "% -*- pdf: My Thesis -*-\n% -*- program: lualatex -*-\n");
        let chapter = write(dir.path(), "chapter.tex", "% -*- root: main -*-\n");

        let ctx = context();
        let mut file = TexFile::new(&ctx, &chapter);
        assert_eq!(file.get_option("program", None).as_deref(), Some("lualatex"));
        assert_eq!(file.get_option("prefix", Some("x".to_string())).as_deref(), Some("x"));
        assert_eq!(file.root_file().pdf_file_name(), "My_Thesis.pdf");
        assert_eq!(file.pdf_file_name(), "My_Thesis.pdf");
    }

    #[test]
    fn test_output_directory_flat() {
        let dir = TempDir::new().unwrap();
        let main = write(dir.path(), "main.tex", "");
        let ctx = context();

        let out = TexFile::new(&ctx, &main).output_directory(Some("partial"));
        assert_eq!(out, dir.path().join("Output").join("partial"));
        assert!(out.is_dir());
    }

    #[test]
    fn test_output_directory_disabled_returns_root_dir() {
        let dir = TempDir::new().unwrap();
        let main = write(dir.path(), "main.tex", "");
        let settings = Settings {
            output_directory: false,
            ..Settings::default()
        };
        let ctx = Context::new(Arc::new(DerivedDataCache::in_memory()), settings);
        assert_eq!(TexFile::new(&ctx, &main).output_directory(None), dir.path().to_path_buf());
    }

    #[test]
    fn test_words_aggregate() {
        let dir = TempDir::new().unwrap();
        let main = write(dir.path(), "main.tex", "x the big red dog\nx the big red dog\n\\input{b}\n");
        write(dir.path(), "b.tex", "x the big red dog\nx the big red dog\n");

        let ctx = context();
        let words = TexFile::new(&ctx, &main).words(true);
        assert_eq!(words[0].count, 4);
        assert_eq!(words[0].text, "the big red");
    }
}
