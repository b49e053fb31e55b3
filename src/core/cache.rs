//! Time-stamped derived-data cache with debounced persistence.
//!
//! Every category (`tex.cache`, `bib.cache`, `pkg.cache`, one per remote
//! source) is a [`CacheBlob`]: a record time plus a JSON object. The
//! in-memory copy is authoritative; disk writes are coalesced by a pending
//! flag and a single timer thread, and [`CacheStore::flush`] writes
//! everything synchronously.
//!
//! # Public API
//! - [`CacheStore`]: the interface components receive through the context
//! - [`DerivedDataCache`]: the disk-backed implementation
//! - [`load_entry`] / [`store_entry`]: typed access to one key of a category
//!
//! A blob that cannot be read or decoded behaves like an empty blob stamped
//! [`STALE_RTIME`].

use crate::core::error::{Result, TexSenseError};
use chrono::{Local, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const TEX_CACHE: &str = "tex.cache";
pub const BIB_CACHE: &str = "bib.cache";
pub const PKG_CACHE: &str = "pkg.cache";

pub const RTIME_FORMAT: &str = "%d.%m.%YT%H:%M:%S";
pub const STALE_RTIME: &str = "01.01.2000T00:00:00";

pub fn remote_cache_name(source: &str) -> String {
    format!("{source}.cache")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheBlob {
    pub rtime: String,
    pub data: Map<String, Value>,
}

impl CacheBlob {
    pub fn stale() -> Self {
        Self {
            rtime: STALE_RTIME.to_string(),
            data: Map::new(),
        }
    }

    pub fn stamp(&mut self) {
        self.rtime = Local::now().naive_local().format(RTIME_FORMAT).to_string();
    }

    /// Older than `hours` relative to `now`; exactly `hours` old is fresh
    pub fn is_outdated_at(&self, hours: u64, now: NaiveDateTime) -> bool {
        match NaiveDateTime::parse_from_str(&self.rtime, RTIME_FORMAT) {
            Ok(rtime) => (now - rtime).num_seconds() > (hours * 3600) as i64,
            Err(e) => {
                log::debug!("unreadable rtime '{}': {e}", self.rtime);
                true
            }
        }
    }
}

pub trait CacheStore: Send + Sync {
    /// Copy of a whole category
    fn get(&self, category: &str) -> CacheBlob;
    /// One key of a category's data
    fn entry(&self, category: &str, key: &str) -> Option<Value>;
    /// Replace a category's data
    fn set(&self, category: &str, data: Map<String, Value>, stamp: bool);
    /// Merge keys into a category's data
    fn add(&self, category: &str, data: Map<String, Value>, stamp: bool);
    fn remove(&self, category: &str, key: &str);
    /// Soft clear marks the category maximally stale, hard clear deletes it
    fn clear(&self, category: &str, soft: bool) -> Result<()>;
    fn is_outdated(&self, category: &str, hours: u64) -> bool;
    /// Categories currently held in memory
    fn categories(&self) -> Vec<String>;
    /// Write every modified category now
    fn flush(&self) -> Result<()>;
}

struct Inner {
    dir: Option<PathBuf>,
    window: Duration,
    blobs: Mutex<HashMap<String, CacheBlob>>,
    dirty: Mutex<HashSet<String>>,
    pending: AtomicBool,
}

/// Disk-backed [`CacheStore`], one JSON file per category
#[derive(Clone)]
pub struct DerivedDataCache {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn format_size(bytes: usize) -> String {
    match bytes {
        b if b < 1024 => format!("{b} B"),
        b if b < 1024 * 1024 => format!("{:.1} KB", b as f64 / 1024.0),
        b => format!("{:.1} MB", b as f64 / (1024.0 * 1024.0)),
    }
}

impl DerivedDataCache {
    /// Cache persisted below `dir`, writes debounced by `window`
    pub fn new(dir: Option<PathBuf>, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir,
                window,
                blobs: Mutex::new(HashMap::new()),
                dirty: Mutex::new(HashSet::new()),
                pending: AtomicBool::new(false),
            }),
        }
    }

    /// Cache that never touches the disk
    pub fn in_memory() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub fn directory(&self) -> Option<&PathBuf> {
        self.inner.dir.as_ref()
    }

    fn read(&self, category: &str) -> Option<CacheBlob> {
        let path = self.inner.dir.as_ref()?.join(category);
        let content = fs::read_to_string(&path).ok()?;
        log::info!("{category} ({})", format_size(content.len()));
        match serde_json::from_str(&content) {
            Ok(blob) => Some(blob),
            Err(e) => {
                log::warn!("Discarding corrupted cache '{}': {e}", path.display());
                None
            }
        }
    }

    fn with_blob<R>(&self, category: &str, f: impl FnOnce(&mut CacheBlob) -> R) -> R {
        let mut blobs = lock(&self.inner.blobs);
        if !blobs.contains_key(category) {
            let blob = self.read(category).unwrap_or_else(CacheBlob::stale);
            blobs.insert(category.to_string(), blob);
        }
        let blob = blobs
            .entry(category.to_string())
            .or_insert_with(CacheBlob::stale);
        f(blob)
    }

    fn modified(&self, category: &str) {
        lock(&self.inner.dirty).insert(category.to_string());
        self.schedule_save();
    }

    /// Coalesce writes: at most one timer is pending at a time
    fn schedule_save(&self) {
        if self.inner.dir.is_none() {
            return;
        }
        if self.inner.window.is_zero() {
            if let Err(e) = self.flush() {
                log::error!("Failed to save cache: {e}");
            }
            return;
        }
        if self.inner.pending.swap(true, Ordering::SeqCst) {
            log::debug!("Skipped save, one is already pending");
            return;
        }

        let cache = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep(cache.inner.window);
            cache.inner.pending.store(false, Ordering::SeqCst);
            if let Err(e) = cache.flush() {
                log::error!("Failed to save cache: {e}");
            }
        });
    }

    fn write(&self, category: &str, blob: &CacheBlob) -> Result<()> {
        let Some(dir) = &self.inner.dir else {
            return Ok(());
        };
        if let Err(e) = fs::create_dir_all(dir) {
            log::error!("Failed to create cache directory '{}': {}", dir.display(), e);
            return Err(TexSenseError::cache_directory_creation_failed(dir, e));
        }

        let json = serde_json::to_string(blob).map_err(TexSenseError::cache_serialization_failed)?;
        let path = dir.join(category);
        fs::write(&path, &json).map_err(|e| TexSenseError::cache_write_failed(&path, e))?;
        log::info!("{category} ({})", format_size(json.len()));
        Ok(())
    }
}

impl CacheStore for DerivedDataCache {
    fn get(&self, category: &str) -> CacheBlob {
        // Held across the disk read so a concurrent set is never overwritten
        let mut blobs = lock(&self.inner.blobs);
        if let Some(blob) = blobs.get(category) {
            return blob.clone();
        }
        match self.read(category) {
            Some(blob) => {
                blobs.insert(category.to_string(), blob.clone());
                blob
            }
            None => CacheBlob::stale(),
        }
    }

    fn entry(&self, category: &str, key: &str) -> Option<Value> {
        self.with_blob(category, |blob| blob.data.get(key).cloned())
    }

    fn set(&self, category: &str, data: Map<String, Value>, stamp: bool) {
        self.with_blob(category, |blob| {
            blob.data = data;
            if stamp {
                blob.stamp();
            }
        });
        self.modified(category);
    }

    fn add(&self, category: &str, data: Map<String, Value>, stamp: bool) {
        self.with_blob(category, |blob| {
            blob.data.extend(data);
            if stamp {
                blob.stamp();
            }
        });
        self.modified(category);
    }

    fn remove(&self, category: &str, key: &str) {
        if self.with_blob(category, |blob| blob.data.remove(key)).is_some() {
            self.modified(category);
        }
    }

    fn clear(&self, category: &str, soft: bool) -> Result<()> {
        if soft {
            self.with_blob(category, |blob| blob.rtime = STALE_RTIME.to_string());
            self.modified(category);
        } else {
            lock(&self.inner.blobs).remove(category);
            lock(&self.inner.dirty).remove(category);
            if let Some(dir) = &self.inner.dir {
                let path = dir.join(category);
                if path.is_file() {
                    fs::remove_file(&path).map_err(|e| TexSenseError::cache_remove_failed(&path, e))?;
                }
            }
        }
        log::info!("{category} ({})", if soft { "soft" } else { "hard" });
        Ok(())
    }

    fn is_outdated(&self, category: &str, hours: u64) -> bool {
        let outdated = self.get(category).is_outdated_at(hours, Local::now().naive_local());
        log::debug!("{category} outdated: {outdated}");
        outdated
    }

    fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner.blobs).keys().cloned().collect();
        names.sort();
        names
    }

    fn flush(&self) -> Result<()> {
        let dirty: Vec<String> = lock(&self.inner.dirty).drain().collect();
        for (i, category) in dirty.iter().enumerate() {
            let blob = lock(&self.inner.blobs).get(category).cloned();
            if let Some(blob) = blob {
                if let Err(e) = self.write(category, &blob) {
                    // Unwritten categories stay dirty for the next flush
                    lock(&self.inner.dirty).extend(dirty[i..].iter().cloned());
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// Decode one cached value; decode failures count as a miss
pub fn load_entry<T: DeserializeOwned>(cache: &dyn CacheStore, category: &str, key: &str) -> Option<T> {
    let value = cache.entry(category, key)?;
    match serde_json::from_value(value) {
        Ok(entry) => Some(entry),
        Err(e) => {
            log::warn!("Ignoring cached '{key}' in {category}: {e}");
            None
        }
    }
}

pub fn store_entry<T: Serialize>(cache: &dyn CacheStore, category: &str, key: &str, value: &T) {
    match serde_json::to_value(value) {
        Ok(value) => {
            let mut data = Map::new();
            data.insert(key.to_string(), value);
            cache.add(category, data, false);
        }
        Err(e) => log::error!("Failed to serialize cache entry '{key}': {e}"),
    }
}
