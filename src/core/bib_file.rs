//! Cache-backed model of one `.bib` file.

use crate::core::bib::BibEntry;
use crate::core::bib_tokenizer::find_cites;
use crate::core::cache::{load_entry, store_entry, BIB_CACHE};
use crate::core::config::Context;
use crate::core::dirs::expand_home;
use crate::core::error::{Result, TexSenseError};
use crate::core::maintenance::refresh_bib_cache;
use crate::core::scanner::{scan_argument, Delimiter, ScanOutcome};
use crate::core::source::read_source;
use crate::core::tex_file::{absolute, modification_time};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

lazy_static! {
    static ref RE_WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Parsed content of one `.bib` file, as stored in `bib.cache`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BibData {
    #[serde(default)]
    pub mtime: u64,
    #[serde(default)]
    pub cites: Vec<BibEntry>,
}

/// Tokenize a file from disk, ignoring the cache
pub fn parse_bib_file(path: &Path) -> Result<BibData> {
    let source = read_source(path, false)?;
    let data = BibData {
        mtime: modification_time(path),
        cites: find_cites(&source.lines),
    };
    log::debug!("parsed {} ({} entries)", path.display(), data.cites.len());
    Ok(data)
}

pub struct BibFile {
    ctx: Context,
    path: PathBuf,
    data: Option<BibData>,
}

impl BibFile {
    /// A leading `~` expands to the home directory
    pub fn new(ctx: &Context, path: impl AsRef<Path>) -> Self {
        let path = expand_home(&path.as_ref().to_string_lossy());
        Self {
            ctx: ctx.clone(),
            path: absolute(&path),
            data: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn cache_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Load the entries of this file, through the cache when enabled.
    pub fn run(&mut self, use_cache: bool, force_refresh: bool) -> Result<&BibData> {
        if !self.path.is_file() {
            self.data = None;
            return Err(TexSenseError::source_missing(&self.path));
        }

        let hours = self.ctx.settings.cache_hours("bib");
        let caching = use_cache && hours > 0;
        let key = self.cache_key();

        if caching && !force_refresh {
            if self.ctx.cache.is_outdated(BIB_CACHE, hours) {
                refresh_bib_cache(&self.ctx, true);
            }
            let cached: Option<BibData> = load_entry(self.ctx.cache.as_ref(), BIB_CACHE, &key);
            if let Some(data) = cached.filter(|d| d.mtime == modification_time(&self.path)) {
                log::debug!("cache hit: {key}");
                return Ok(self.data.insert(data));
            }
        }

        let data = parse_bib_file(&self.path)?;
        if caching {
            store_entry(self.ctx.cache.as_ref(), BIB_CACHE, &key, &data);
        }
        Ok(self.data.insert(data))
    }

    fn ensure(&mut self) -> &BibData {
        if self.data.is_none() {
            if let Err(e) = self.run(true, false).map(|_| ()) {
                log::debug!("{e}");
            }
        }
        self.data.get_or_insert_with(BibData::default)
    }

    /// Entries in file order, tagged with the file name
    pub fn cites(&mut self) -> Vec<BibEntry> {
        let origin = self.file_name();
        self.ensure()
            .cites
            .iter()
            .map(|c| c.clone().with_origin(origin.clone()))
            .collect()
    }

    pub fn cite(&mut self, key: &str) -> Option<BibEntry> {
        self.cites().into_iter().find(|c| c.key == key)
    }

    pub fn cite_keys(&mut self) -> Vec<String> {
        self.ensure().cites.iter().map(|c| c.key.clone()).collect()
    }

    pub fn has_cite(&mut self, key: &str) -> bool {
        self.ensure().cites.iter().any(|c| c.key == key)
    }

    /// Raw source of the entry `key` with all whitespace removed
    pub fn cite_source(&self, key: &str) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let pattern = Regex::new(&format!(r"@\w+\{{{}\b", regex::escape(key))).ok()?;
        let start = pattern.find(&content)?.start();
        match scan_argument(&content, start, Delimiter::Brace, 0) {
            ScanOutcome::End(end) => Some(RE_WHITESPACE.replace_all(&content[start..end], "").into_owned()),
            _ => None,
        }
    }

    /// Add an entry, replacing an existing one with the same key
    pub fn add_cite(&mut self, entry: &BibEntry) -> Result<()> {
        if self.has_cite(&entry.key) {
            let mut cites = vec![entry.clone()];
            cites.extend(self.cites().into_iter().filter(|c| c.key != entry.key));
            self.write_cites(&cites, true)
        } else {
            self.write_cites(std::slice::from_ref(entry), false)
        }
    }

    /// Rewrite the file with entries of matching keys replaced.
    ///
    /// Repeated keys in the file are written once.
    pub fn update_cites(&mut self, entries: &[BibEntry]) -> Result<()> {
        let replacements: HashMap<&str, &BibEntry> = entries.iter().map(|e| (e.key.as_str(), e)).collect();
        let mut seen = HashSet::new();
        let mut cites = Vec::new();
        for cite in self.cites() {
            if !seen.insert(cite.key.clone()) {
                continue;
            }
            match replacements.get(cite.key.as_str()) {
                Some(replacement) => cites.push((*replacement).clone()),
                None => cites.push(cite),
            }
        }
        self.write_cites(&cites, true)
    }

    fn write_cites(&mut self, cites: &[BibEntry], clear: bool) -> Result<()> {
        let mut content = if clear {
            String::new()
        } else {
            std::fs::read_to_string(&self.path).unwrap_or_default()
        };
        for cite in cites {
            let text = cite.to_bibtex();
            if content.is_empty() {
                content.push_str(text.trim_start());
            } else {
                content.push_str(&text);
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        log::info!("wrote {} entries to {}", cites.len(), self.path.display());

        self.run(true, true)?;
        Ok(())
    }
}
