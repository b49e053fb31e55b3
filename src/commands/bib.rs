use crate::core::{
    bib::disambiguate_keys,
    bib_file::BibFile,
    command_init::{CommandInit, CommandOptions},
    dirs::expand_home,
    error::Result,
};
use colored::*;
use std::path::Path;

/// List the records of a bibliography file under their presentation keys
pub fn execute_bib(options: &CommandOptions, file: &Path) -> Result<()> {
    let path = expand_home(&file.to_string_lossy());
    let ctx = CommandInit::initialize(options, Some(&path))?;
    let mut bib = BibFile::new(&ctx, &path);
    bib.run(true, false)?;

    let cites = bib.cites();
    let keys = disambiguate_keys(cites.iter().map(|c| c.key.as_str()));
    println!();
    for (mut cite, key) in cites.into_iter().zip(keys) {
        cite.key = key;
        let lines = cite.panel_lines(&ctx.settings.cite_panel_format);
        let mut lines = lines.iter();
        if let Some(first) = lines.next() {
            println!("{}", first.white());
        }
        for line in lines {
            println!("  {}", line.bright_black());
        }
    }
    println!("\n{} entries in {}", bib.cite_keys().len(), bib.file_name());

    if let Err(e) = ctx.cache.flush() {
        log::warn!("Cache save failed: {e}");
    }
    Ok(())
}
