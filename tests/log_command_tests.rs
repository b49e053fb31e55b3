use assert_cmd::prelude::*;
use predicates::prelude::*;

mod common;
use common::{assertions, fixtures::*};

#[cfg(test)]
mod log_command_tests {
    use super::*;

    #[test]
    fn test_log_reports_badbox_against_document() -> anyhow::Result<()> {
        let project = TestProject::new()?;
        let tex = project.write("doc.tex", "")?;
        let log = project.write(
            "Output/doc.log",
            "Overfull \\hbox (15.0pt too wide) in paragraph at lines 42--45\n",
        )?;

        project
            .command()?
            .arg("log")
            .arg(&log)
            .arg("--tex")
            .arg(&tex)
            .assert()
            .success()
            .stdout(assertions::has_diagnostic(
                'B',
                &tex,
                42,
                "Overfull \\hbox (15.0pt too wide) in paragraph",
            ))
            .stdout(assertions::has_summary("0 errors, 0 warnings, 1 badbox"));

        Ok(())
    }

    #[test]
    fn test_log_with_errors_fails() -> anyhow::Result<()> {
        let project = TestProject::new()?;
        project.write("doc.tex", "")?;
        let log = project.write("doc.log", "(./doc.tex\n! Undefined control sequence.\nl.12 \\foo\n)\n")?;

        project
            .command()?
            .arg("log")
            .arg(&log)
            .assert()
            .failure()
            .code(1)
            .stdout(assertions::has_diagnostic(
                'E',
                &project.path("doc.tex"),
                12,
                "Undefined control sequence \\foo",
            ))
            .stdout(assertions::has_summary("1 error, 0 warnings, 0 badboxes"));

        Ok(())
    }

    #[test]
    fn test_log_missing_file() -> anyhow::Result<()> {
        let project = TestProject::new()?;

        project
            .command()?
            .arg("log")
            .arg(project.path("none.log"))
            .assert()
            .failure()
            .code(4)
            .stdout(predicate::str::is_empty());

        Ok(())
    }
}
