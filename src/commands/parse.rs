use crate::core::{
    command_init::{CommandInit, CommandOptions},
    error::Result,
    output::print_section_header,
    paths::relative_to,
    tex_data::Category,
    tex_file::TexFile,
};
use colored::*;
use std::path::Path;

/// Print the extracted structure of `file`, or of its whole document tree
/// with `walk`
pub fn execute_parse(options: &CommandOptions, file: &Path, category: Option<Category>, walk: bool) -> Result<()> {
    let ctx = CommandInit::initialize(options, Some(file))?;
    let mut tex = TexFile::new(&ctx, file);
    tex.run(true, false)?;

    let root = tex.root_file_path();
    let root_dir = root.parent().map(Path::to_path_buf).unwrap_or_default();
    println!("\n{} {}", "File:".bright_black(), tex.path().display().to_string().white());
    println!("{} {}", "Root:".bright_black(), root.display().to_string().white());
    if let Some(class) = tex.documentclass(true) {
        let option = class.option.map(|o| format!("[{o}]")).unwrap_or_default();
        println!("{} {}{}", "Class:".bright_black(), class.name.white(), option.bright_black());
    }

    if walk {
        print_section_header("Files");
        for path in tex.files() {
            println!("  {}", relative_to(&path, &root_dir));
        }
    }

    let categories = match category {
        Some(category) => vec![category],
        None => Category::ALL.to_vec(),
    };
    for category in categories {
        if category == Category::Words {
            let words = tex.words(walk);
            if words.is_empty() {
                continue;
            }
            print_section_header(category.as_str());
            for phrase in words {
                println!("  {:>4}  {}", phrase.count.to_string().bright_black(), phrase.text);
            }
            continue;
        }

        let items = tex.get(category, walk);
        if items.is_empty() {
            continue;
        }
        print_section_header(category.as_str());
        for (path, occurrence) in items {
            let location = relative_to(&path, &root_dir);
            match occurrence.as_command() {
                Some(command) => println!(
                    "  {}  {}",
                    format!("{location}:{}", command.line).bright_black(),
                    command.tag
                ),
                None => println!("  {}  {occurrence}", location.bright_black()),
            }
        }
    }

    if let Err(e) = ctx.cache.flush() {
        log::warn!("Cache save failed: {e}");
    }
    Ok(())
}
