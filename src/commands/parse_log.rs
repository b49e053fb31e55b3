use crate::core::{
    diagnostics::DiagnosticsSink,
    error::Result,
    log_parser::LogParser,
    output::ConsoleSink,
};
use std::path::{Path, PathBuf};

/// Document a log belongs to when none is given: the log's path with the
/// `.tex` extension
pub fn default_tex_path(log_file: &Path) -> PathBuf {
    log_file.with_extension("tex")
}

/// Print the diagnostics of an existing compiler log.
///
/// Returns whether the log is free of errors.
pub fn execute_log(log_file: &Path, tex: Option<&Path>) -> Result<bool> {
    let tex = tex.map(Path::to_path_buf).unwrap_or_else(|| default_tex_path(log_file));
    let diagnostics = LogParser::parse_file(&tex, log_file)?;

    let mut lines = diagnostics.lines();
    lines.push(diagnostics.summary());
    ConsoleSink.publish(&lines);
    Ok(!diagnostics.has_errors())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tex_path() {
        assert_eq!(default_tex_path(Path::new("/doc/Output/main.log")), PathBuf::from("/doc/Output/main.tex"));
    }
}
