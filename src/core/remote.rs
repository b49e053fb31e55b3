//! Cached citation records from remote reference managers.
//!
//! A [`RemoteSource`] knows how to talk to one service; this module only
//! consumes the records it returns. Each source gets its own
//! `<name>.cache` category holding `{cites, cites_no_key}`.

use crate::core::bib::{disambiguate_keys, fill_placeholders, tidy_accents, title_case, validate_citekey, BibEntry};
use crate::core::cache::remote_cache_name;
use crate::core::config::{Context, Settings};
use crate::core::error::{Result, TexSenseError};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

lazy_static! {
    static ref RE_BRACED_AUTHOR: Regex = Regex::new(r"\{([^}]+)\}").unwrap();
    static ref RE_FIRST_AUTHOR: Regex = Regex::new(r"([\w{}]+)(\sand\s|$|,)").unwrap();
}

/// One record as delivered by a remote source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// The service's own citation key
    pub key: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Key generated from the configured pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cite_key: Option<String>,
}

impl RemoteRecord {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Contents of a `<name>.cache` category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCites {
    #[serde(default)]
    pub cites: Vec<RemoteRecord>,
    /// Records the service delivered without a usable key
    #[serde(default)]
    pub cites_no_key: Vec<RemoteRecord>,
}

impl RemoteCites {
    pub fn is_empty(&self) -> bool {
        self.cites.is_empty() && self.cites_no_key.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Ok {
        records: Vec<RemoteRecord>,
        unkeyed: Vec<RemoteRecord>,
    },
    /// Authorization or synchronisation still pending
    Waiting,
    Error(String),
}

pub trait RemoteSource: Send + Sync {
    /// Cache and settings name, e.g. `zotero`
    fn name(&self) -> &str;
    /// Origin shown with each entry, e.g. `Zotero.org`
    fn label(&self) -> &str;
    /// Current records; `known` holds what the cache has, for incremental sync
    fn fetch(&self, known: &RemoteCites) -> RemoteStatus;
}

/// How [`RemoteLibrary::run`] obtained its records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Cached,
    Fetched,
    Waiting,
}

/// Generated citation key of `record` following `settings.cite_key_pattern`
pub fn build_cite_key(settings: &Settings, record: &RemoteRecord) -> Option<String> {
    let names = record.field("author").or_else(|| record.field("editor"))?;
    let author = match RE_BRACED_AUTHOR.captures(names) {
        Some(caps) => tidy_accents(&caps[1]),
        None => tidy_accents(&RE_FIRST_AUTHOR.captures(names)?[1]),
    };

    let title = match record.field("title") {
        Some(title) => {
            let first = title
                .split(' ')
                .find(|word| !settings.cite_key_blacklist.contains(&word.to_lowercase()));
            tidy_accents(first.unwrap_or("None"))
        }
        None => "None".to_string(),
    };
    let year = record
        .field("year")
        .filter(|y| !y.is_empty())
        .unwrap_or("????")
        .to_string();

    let values = [
        ("author", author.clone()),
        ("Author", title_case(&author)),
        ("year", year.clone()),
        ("Year", year),
        ("title", title.clone()),
        ("Title", title_case(&title)),
    ];
    let key = validate_citekey(&fill_placeholders(&settings.cite_key_pattern, &values).replace(' ', ""));
    (!key.is_empty()).then_some(key)
}

/// One remote source together with its cache category
pub struct RemoteLibrary {
    ctx: Context,
    source: Arc<dyn RemoteSource>,
    data: RemoteCites,
}

impl RemoteLibrary {
    pub fn new(ctx: &Context, source: Arc<dyn RemoteSource>) -> Self {
        Self {
            ctx: ctx.clone(),
            source,
            data: RemoteCites::default(),
        }
    }

    pub fn cache_name(&self) -> String {
        remote_cache_name(self.source.name())
    }

    pub fn data(&self) -> &RemoteCites {
        &self.data
    }

    fn cached(&self) -> RemoteCites {
        let blob = self.ctx.cache.get(&self.cache_name());
        serde_json::from_value(Value::Object(blob.data)).unwrap_or_else(|e| {
            log::warn!("Ignoring cached {}: {e}", self.cache_name());
            RemoteCites::default()
        })
    }

    fn rebuild_keys(&mut self) {
        for record in &mut self.data.cites {
            record.cite_key = build_cite_key(&self.ctx.settings, record);
        }
    }

    /// Adopt the cache while fresh, otherwise fetch from the source.
    ///
    /// With `synchronise` the source is always asked, and receives the
    /// cached records for an incremental update.
    pub fn run(&mut self, synchronise: bool) -> Result<Refresh> {
        let name = self.cache_name();
        let hours = self.ctx.settings.cache_hours(self.source.name());
        let cached = if hours > 0 { self.cached() } else { RemoteCites::default() };

        if !cached.is_empty() && !synchronise && !self.ctx.cache.is_outdated(&name, hours) {
            self.data = cached;
            self.rebuild_keys();
            return Ok(Refresh::Cached);
        }

        let known = if synchronise { cached } else { RemoteCites::default() };
        match self.source.fetch(&known) {
            RemoteStatus::Ok { records, unkeyed } => {
                self.data = RemoteCites {
                    cites: records,
                    cites_no_key: unkeyed,
                };
                self.rebuild_keys();
                if hours > 0 {
                    if let Value::Object(data) = serde_json::to_value(&self.data)? {
                        self.ctx.cache.set(&name, data, true);
                    }
                }
                log::info!("{}: {} records", self.source.label(), self.data.cites.len());
                Ok(Refresh::Fetched)
            }
            RemoteStatus::Waiting => {
                log::info!("{}: waiting", self.source.label());
                Ok(Refresh::Waiting)
            }
            RemoteStatus::Error(message) => Err(TexSenseError::remote_source(self.source.name(), message)),
        }
    }

    /// Entries under their presentation keys.
    ///
    /// The service key is used with `internal_cite_key`, the generated one
    /// otherwise; records without a key are skipped and repeated keys get
    /// `a`, `b`, ... appended.
    pub fn presented_cites(&self) -> Vec<BibEntry> {
        let keyed: Vec<(&RemoteRecord, &str)> = self
            .data
            .cites
            .iter()
            .filter_map(|record| {
                let key = if self.ctx.settings.internal_cite_key {
                    Some(record.key.as_str()).filter(|k| !k.is_empty())
                } else {
                    record.cite_key.as_deref()
                };
                if key.is_none() {
                    log::info!("Skip {}", record.key);
                }
                key.map(|k| (record, k))
            })
            .collect();

        let presented = disambiguate_keys(keyed.iter().map(|(_, key)| *key));
        keyed
            .into_iter()
            .zip(presented)
            .map(|((record, _), key)| BibEntry {
                key,
                entry_type: record.entry_type.clone(),
                fields: record.fields.clone(),
                tags: record.tags.clone(),
                folders: record.folders.clone(),
                origin: self.source.label().to_string(),
            })
            .collect()
    }
}

/// Entries of every source, skipping keys listed earlier.
///
/// `local` holds the keys already present in local bibliography files.
pub fn find_remote_cites(libraries: &mut [RemoteLibrary], local: &[String]) -> Vec<BibEntry> {
    let mut keys: HashSet<String> = local.iter().cloned().collect();
    let mut found = Vec::new();

    for library in libraries.iter_mut() {
        if library.data.is_empty() {
            if let Err(e) = library.run(false) {
                log::warn!("{e}");
                continue;
            }
        }
        let fresh: Vec<BibEntry> = library
            .presented_cites()
            .into_iter()
            .filter(|entry| !keys.contains(&entry.key))
            .collect();
        keys.extend(fresh.iter().map(|e| e.key.clone()));
        found.extend(fresh);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::DerivedDataCache;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeSource {
        name: &'static str,
        status: Mutex<RemoteStatus>,
        fetches: AtomicUsize,
    }

    impl FakeSource {
        fn new(name: &'static str, status: RemoteStatus) -> Arc<Self> {
            Arc::new(Self {
                name,
                status: Mutex::new(status),
                fetches: AtomicUsize::new(0),
            })
        }
    }

    impl RemoteSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        fn label(&self) -> &str {
            "Fake.org"
        }

        fn fetch(&self, _known: &RemoteCites) -> RemoteStatus {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.status.lock().unwrap().clone()
        }
    }

    fn record(key: &str, author: &str, title: &str, year: &str) -> RemoteRecord {
        RemoteRecord {
            key: key.to_string(),
            entry_type: "Article".to_string(),
            fields: BTreeMap::from([
                ("author".to_string(), author.to_string()),
                ("title".to_string(), title.to_string()),
                ("year".to_string(), year.to_string()),
            ]),
            ..Default::default()
        }
    }

    fn context() -> Context {
        Context::new(Arc::new(DerivedDataCache::in_memory()), Settings::default())
    }

    #[test]
    fn test_build_cite_key() {
        let settings = Settings {
            cite_key_pattern: "{Author}{year}{title}".to_string(),
            cite_key_blacklist: vec!["the".to_string()],
            ..Settings::default()
        };
        let r = record("x", "Müller, Hans and Doe, J.", "The Art of Things", "2020");
        assert_eq!(build_cite_key(&settings, &r).as_deref(), Some("Mueller2020art"));

        let braced = record("y", "{World Health Organization}", "Report", "");
        assert_eq!(
            build_cite_key(&Settings::default(), &braced).as_deref(),
            Some("WorldHealthOrganization????")
        );

        let mut anonymous = record("z", "", "T", "2001");
        anonymous.fields.remove("author");
        assert_eq!(build_cite_key(&Settings::default(), &anonymous), None);
    }

    #[test]
    fn test_duplicate_keys_are_disambiguated_for_presentation() {
        let ctx = context();
        let source = FakeSource::new(
            "fake",
            RemoteStatus::Ok {
                records: vec![
                    record("a1", "Smith, J.", "One", "2020"),
                    record("a2", "Smith, K.", "Two", "2020"),
                    record("a3", "Doe, J.", "Three", "2019"),
                ],
                unkeyed: vec![],
            },
        );
        let mut library = RemoteLibrary::new(&ctx, source);
        assert_eq!(library.run(false).unwrap(), Refresh::Fetched);

        let keys: Vec<String> = library.presented_cites().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["Smith2020", "Smith2020a", "Doe2019"]);
        assert_eq!(library.data().cites[1].cite_key.as_deref(), Some("Smith2020"));
        assert_eq!(library.presented_cites()[0].origin, "Fake.org");
    }

    #[test]
    fn test_fresh_cache_is_adopted() {
        let ctx = context();
        let source = FakeSource::new(
            "fake",
            RemoteStatus::Ok {
                records: vec![record("a1", "Smith, J.", "One", "2020")],
                unkeyed: vec![],
            },
        );

        RemoteLibrary::new(&ctx, source.clone()).run(false).unwrap();
        let mut again = RemoteLibrary::new(&ctx, source.clone());
        assert_eq!(again.run(false).unwrap(), Refresh::Cached);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(again.run(true).unwrap(), Refresh::Fetched);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_error_and_waiting() {
        let ctx = context();
        let failing = FakeSource::new("broken", RemoteStatus::Error("offline".to_string()));
        let err = RemoteLibrary::new(&ctx, failing).run(false).unwrap_err();
        assert!(matches!(err, TexSenseError::RemoteSource { .. }));

        let waiting = FakeSource::new("slow", RemoteStatus::Waiting);
        assert_eq!(RemoteLibrary::new(&ctx, waiting).run(false).unwrap(), Refresh::Waiting);
    }

    #[test]
    fn test_find_remote_cites_skips_known_keys() {
        let ctx = context();
        let first = FakeSource::new(
            "first",
            RemoteStatus::Ok {
                records: vec![record("a", "Smith, J.", "One", "2020"), record("b", "Doe, J.", "Two", "2019")],
                unkeyed: vec![],
            },
        );
        let second = FakeSource::new(
            "second",
            RemoteStatus::Ok {
                records: vec![record("c", "Doe, J.", "Three", "2019"), record("d", "Roe, R.", "Four", "2018")],
                unkeyed: vec![],
            },
        );
        let mut libraries = vec![RemoteLibrary::new(&ctx, first), RemoteLibrary::new(&ctx, second)];

        let keys: Vec<String> = find_remote_cites(&mut libraries, &["Smith2020".to_string()])
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["Doe2019", "Roe2018"]);
    }
}
