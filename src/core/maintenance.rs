//! Whole-category cache refresh and inspection.

use crate::core::bib_file::parse_bib_file;
use crate::core::cache::{CacheBlob, BIB_CACHE, PKG_CACHE, TEX_CACHE};
use crate::core::config::Context;
use crate::core::tex_file::parse_tex_file;
use serde_json::{Map, Value};
use std::path::Path;
use std::thread::JoinHandle;

/// Categories every installation has
pub const CACHE_NAMES: [&str; 3] = [TEX_CACHE, BIB_CACHE, PKG_CACHE];

/// Settings key of a category, `tex.cache` -> `tex`
pub fn settings_key(category: &str) -> &str {
    category.strip_suffix(".cache").unwrap_or(category)
}

fn refresh_paths(
    ctx: &Context,
    category: &str,
    force: bool,
    parse: impl Fn(&Path) -> Option<Value>,
) -> usize {
    let hours = ctx.settings.cache_hours(settings_key(category));
    if hours == 0 {
        return 0;
    }
    if !force && !ctx.cache.is_outdated(category, hours) {
        log::debug!("{category}: up to date");
        return 0;
    }

    let blob = ctx.cache.get(category);
    let mut data = Map::new();
    for key in blob.data.keys() {
        let path = Path::new(key);
        if !path.is_file() {
            log::debug!("dropping vanished {key}");
            continue;
        }
        if let Some(value) = parse(path) {
            data.insert(key.clone(), value);
        }
    }

    let refreshed = data.len();
    ctx.cache.set(category, data, true);
    log::info!("{category}: refreshed {refreshed} entries");
    refreshed
}

/// Re-parse every cached TeX file that still exists and re-stamp the
/// category. Unless `force` is set, a fresh category is left alone.
pub fn refresh_tex_cache(ctx: &Context, force: bool) -> usize {
    refresh_paths(ctx, TEX_CACHE, force, |path| {
        parse_tex_file(ctx, path)
            .ok()
            .and_then(|data| serde_json::to_value(data).ok())
    })
}

/// [`refresh_tex_cache`] for `bib.cache`
pub fn refresh_bib_cache(ctx: &Context, force: bool) -> usize {
    refresh_paths(ctx, BIB_CACHE, force, |path| {
        parse_bib_file(path)
            .ok()
            .and_then(|data| serde_json::to_value(data).ok())
    })
}

/// Refresh the named categories on a worker thread.
///
/// The handle yields the number of entries refreshed per category.
pub fn spawn_refresh(ctx: &Context, categories: Vec<String>, force: bool) -> JoinHandle<Vec<(String, usize)>> {
    let ctx = ctx.clone();
    std::thread::spawn(move || {
        categories
            .into_iter()
            .map(|category| {
                let count = match category.as_str() {
                    TEX_CACHE => refresh_tex_cache(&ctx, force),
                    BIB_CACHE => refresh_bib_cache(&ctx, force),
                    other => {
                        log::warn!("{other} cannot be refreshed from local files");
                        0
                    }
                };
                (category, count)
            })
            .collect()
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryReport {
    pub name: String,
    pub rtime: String,
    pub entries: usize,
    pub outdated: bool,
}

/// State of the well-known categories plus any other loaded one
pub fn report(ctx: &Context) -> Vec<CategoryReport> {
    let mut names: Vec<String> = CACHE_NAMES.iter().map(|n| n.to_string()).collect();
    for name in ctx.cache.categories() {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
        .into_iter()
        .map(|name| {
            let CacheBlob { rtime, data } = ctx.cache.get(&name);
            let outdated = ctx.cache.is_outdated(&name, ctx.settings.cache_hours(settings_key(&name)));
            CategoryReport {
                name,
                rtime,
                entries: data.len(),
                outdated,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{load_entry, DerivedDataCache, STALE_RTIME};
    use crate::core::config::Settings;
    use crate::core::tex_data::{Category, TexData};
    use crate::core::tex_file::TexFile;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context() -> Context {
        Context::new(Arc::new(DerivedDataCache::in_memory()), Settings::default())
    }

    #[test]
    fn test_refresh_reparses_and_drops_vanished() {
        let dir = TempDir::new().unwrap();
        let kept = dir.path().join("kept.tex");
        let gone = dir.path().join("gone.tex");
        fs::write(&kept, "\\label{old}\n").unwrap();
        fs::write(&gone, "\\label{x}\n").unwrap();

        let ctx = context();
        TexFile::new(&ctx, &kept).run(true, false).unwrap();
        TexFile::new(&ctx, &gone).run(true, false).unwrap();

        fs::remove_file(&gone).unwrap();
        fs::write(&kept, "\\label{new}\n").unwrap();

        assert_eq!(refresh_tex_cache(&ctx, false), 0);
        assert_eq!(refresh_tex_cache(&ctx, true), 1);

        let data: TexData = load_entry(ctx.cache.as_ref(), TEX_CACHE, &kept.to_string_lossy()).unwrap();
        assert_eq!(data.commands(Category::Label)[0].arguments[0].content, "new");
        assert!(ctx.cache.entry(TEX_CACHE, &gone.to_string_lossy()).is_none());
    }

    #[test]
    fn test_outdated_category_is_refreshed() {
        let dir = TempDir::new().unwrap();
        let refs = dir.path().join("refs.bib");
        fs::write(&refs, "@misc{a,\n title = {A}\n}\n").unwrap();

        let ctx = context();
        crate::core::bib_file::BibFile::new(&ctx, &refs).run(true, false).unwrap();
        ctx.cache.clear(BIB_CACHE, true).unwrap();
        assert_eq!(ctx.cache.get(BIB_CACHE).rtime, STALE_RTIME);

        let handle = spawn_refresh(&ctx, vec![BIB_CACHE.to_string(), PKG_CACHE.to_string()], false);
        let counts = handle.join().unwrap();
        assert_eq!(counts, vec![(BIB_CACHE.to_string(), 1), (PKG_CACHE.to_string(), 0)]);
        assert!(!ctx.cache.is_outdated(BIB_CACHE, 24));
    }

    #[test]
    fn test_disabled_category_is_skipped() {
        let mut settings = Settings::default();
        settings.cache.insert("tex".to_string(), 0);
        let ctx = Context::new(Arc::new(DerivedDataCache::in_memory()), settings);
        assert_eq!(refresh_tex_cache(&ctx, true), 0);
    }

    #[test]
    fn test_report_lists_known_categories() {
        let ctx = context();
        let names: Vec<String> = report(&ctx).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec![TEX_CACHE, BIB_CACHE, PKG_CACHE]);
        assert!(report(&ctx).iter().all(|r| r.outdated && r.entries == 0));
        assert_eq!(settings_key("zotero.cache"), "zotero");
    }
}
