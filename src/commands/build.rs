use crate::core::{
    command_init::{CommandInit, CommandOptions},
    compiler::Compiler,
    error::Result,
    output::{ConsoleNotifier, ConsoleSink},
    process::SystemRunner,
};
use std::path::Path;
use std::sync::Arc;

/// Compile `file` with the configured builder and print its diagnostics.
///
/// Returns whether the build finished without errors.
pub fn execute_build(options: &CommandOptions, file: &Path, assume_yes: bool) -> Result<bool> {
    let ctx = CommandInit::initialize(options, Some(file))?;
    let compiler = Compiler::new(
        &ctx,
        Arc::new(SystemRunner),
        Arc::new(ConsoleSink),
        Arc::new(ConsoleNotifier { assume_yes }),
    );

    let handle = compiler.build(file)?;
    log::debug!("Building {}", handle.root().display());
    let outcome = handle.wait()?;

    if let Err(e) = ctx.cache.flush() {
        log::warn!("Cache save failed: {e}");
    }
    Ok(outcome.success())
}
