//! Checks run on a document before it is compiled.

use crate::core::config::Context;
use crate::core::diagnostics::{Diagnostic, DiagnosticKind};
use crate::core::paths::{add_extension, normalize};
use crate::core::scanner::Delimiter;
use crate::core::tex_data::Category;
use crate::core::tex_file::TexFile;

/// Warnings for `\bibliography`-family arguments naming files that do not
/// exist, resolved against the root directory
pub fn check_linked_bib_files(ctx: &Context, tex: &mut TexFile) -> Vec<Diagnostic> {
    if !ctx.settings.check_source.local_bibliography {
        return Vec::new();
    }

    let mut root = tex.root_file();
    let root_dir = root.dir();
    let mut warnings = Vec::new();
    for (file, occurrence) in root.get(Category::Bibliography, true) {
        let Some(command) = occurrence.as_command() else {
            continue;
        };
        let Some(list) = command.first(Delimiter::Brace) else {
            continue;
        };
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let path = normalize(&root_dir.join(add_extension(name, &ctx.settings.default_bib_extension)));
            if !path.exists() {
                warnings.push(Diagnostic::new(
                    DiagnosticKind::Warning,
                    &file,
                    command.line,
                    format!("File `{name}` not found. {}", command.tag),
                ));
            }
        }
    }
    warnings
}

/// Warning for a remote bibliography file beside the root that the
/// document does not link
pub fn check_remote_bib_file(ctx: &Context, tex: &mut TexFile) -> Vec<Diagnostic> {
    if !ctx.settings.check_source.remote_bibliography {
        return Vec::new();
    }

    let bibname = &ctx.settings.bibname;
    let remote = tex.root_file().dir().join(bibname);
    if remote.is_file() && !tex.bibliography().contains(&remote) {
        return vec![Diagnostic::new(
            DiagnosticKind::Warning,
            tex.path(),
            0,
            format!("File `{bibname}` available but not included."),
        )];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::DerivedDataCache;
    use crate::core::config::Settings;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(settings: Settings) -> Context {
        Context::new(Arc::new(DerivedDataCache::in_memory()), settings)
    }

    #[test]
    fn test_missing_linked_bib_file() {
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("main.tex");
        fs::write(&main, "\\documentclass{article}\n\\bibliography{refs,missing}\n").unwrap();
        fs::write(dir.path().join("refs.bib"), "").unwrap();

        let ctx = context(Settings::default());
        let warnings = check_linked_bib_files(&ctx, &mut TexFile::new(&ctx, &main));
        assert_eq!(
            warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![format!(
                "W: {}:2 File `missing` not found. \\bibliography{{refs,missing}}",
                main.display()
            )]
        );
    }

    #[test]
    fn test_unlinked_remote_bib_file() {
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("main.tex");
        fs::write(&main, "\\bibliography{refs}\n").unwrap();
        fs::write(dir.path().join("refs.bib"), "").unwrap();

        let ctx = context(Settings::default());
        assert!(check_remote_bib_file(&ctx, &mut TexFile::new(&ctx, &main)).is_empty());

        fs::write(dir.path().join("Remote.bib"), "").unwrap();
        let warnings = check_remote_bib_file(&ctx, &mut TexFile::new(&ctx, &main));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "File `Remote.bib` available but not included.");
        assert_eq!(warnings[0].line, 0);
    }

    #[test]
    fn test_checks_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("main.tex");
        fs::write(&main, "\\bibliography{missing}\n").unwrap();
        fs::write(dir.path().join("Remote.bib"), "").unwrap();

        let mut settings = Settings::default();
        settings.check_source.local_bibliography = false;
        settings.check_source.remote_bibliography = false;
        let ctx = context(settings);
        assert!(check_linked_bib_files(&ctx, &mut TexFile::new(&ctx, &main)).is_empty());
        assert!(check_remote_bib_file(&ctx, &mut TexFile::new(&ctx, &main)).is_empty());
    }
}
