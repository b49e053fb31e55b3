use crate::core::{
    cache::PKG_CACHE,
    command_init::{CommandInit, CommandOptions},
    config::Context,
    error::Result,
    maintenance::{report, spawn_refresh, CACHE_NAMES},
    output::{print_section_header, print_success},
    packages::PackageIndex,
    process::SystemRunner,
};
use colored::*;

/// `tex` and `tex.cache` both name the `tex.cache` category
pub fn category_name(name: &str) -> String {
    if name.ends_with(".cache") {
        name.to_string()
    } else {
        format!("{name}.cache")
    }
}

fn flush(ctx: &Context) -> Result<()> {
    ctx.cache.flush()
}

/// Print age, size and staleness of each category
pub fn execute_cache_show(options: &CommandOptions) -> Result<()> {
    let ctx = CommandInit::initialize(options, None)?;
    print_section_header("Categories");
    for category in report(&ctx) {
        let state = if category.outdated { "outdated".yellow() } else { "fresh".green() };
        println!(
            "  {:<16} {:>6} entries  {}  {}",
            category.name,
            category.entries,
            category.rtime.bright_black(),
            state
        );
    }
    println!();
    Ok(())
}

/// Re-parse cached files, or rebuild the package index for `pkg`
pub fn execute_cache_refresh(options: &CommandOptions, category: Option<&str>) -> Result<()> {
    let ctx = CommandInit::initialize(options, None)?;
    let categories: Vec<String> = match category {
        Some(name) => vec![category_name(name)],
        None => CACHE_NAMES.iter().map(|n| n.to_string()).collect(),
    };

    let (packages, files): (Vec<String>, Vec<String>) = categories.into_iter().partition(|c| c == PKG_CACHE);
    if !packages.is_empty() {
        let index = PackageIndex::load(&ctx, &SystemRunner, true)?;
        print_success(&format!(
            "{PKG_CACHE}: {} packages, {} classes, {} styles",
            index.sty.len(),
            index.cls.len(),
            index.bst.len()
        ));
    }

    let refreshed = spawn_refresh(&ctx, files, true).join().unwrap_or_else(|_| {
        log::error!("Cache refresh worker panicked");
        Vec::new()
    });
    for (name, count) in refreshed {
        print_success(&format!("{name}: {count} entries refreshed"));
    }

    flush(&ctx)?;
    println!();
    Ok(())
}

/// Mark categories stale, or delete them with `hard`
pub fn execute_cache_clear(options: &CommandOptions, category: Option<&str>, hard: bool) -> Result<()> {
    let ctx = CommandInit::initialize(options, None)?;
    let categories: Vec<String> = match category {
        Some(name) => vec![category_name(name)],
        None => report(&ctx).into_iter().map(|c| c.name).collect(),
    };

    for name in &categories {
        ctx.cache.clear(name, !hard)?;
    }
    flush(&ctx)?;

    let how = if hard { "Removed" } else { "Invalidated" };
    print_success(&format!("{how} {}", categories.join(", ")));
    println!();
    Ok(())
}
