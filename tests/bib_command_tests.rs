use assert_cmd::prelude::*;
use predicates::prelude::*;

mod common;
use common::fixtures::*;

#[cfg(test)]
mod bib_command_tests {
    use super::*;

    #[test]
    fn test_bib_lists_entries_with_panel_format() -> anyhow::Result<()> {
        let project = create_book_project()?;

        project
            .command()?
            .arg("bib")
            .arg(project.path("refs.bib"))
            .assert()
            .success()
            .stdout(predicate::str::contains("knuth84: The TeXbook"))
            .stdout(predicate::str::contains("#Book by Knuth, Donald E."))
            .stdout(predicate::str::contains("1 entries in refs.bib"));

        Ok(())
    }

    #[test]
    fn test_bib_disambiguates_repeated_keys() -> anyhow::Result<()> {
        let project = TestProject::new()?;
        let bib = project.write(
            "refs.bib",
            "@Article{smith2020,\n  author = {Smith, J.},\n  title = {A Long\n  Title},\n  year = 2020\n}\n\
             @Article{smith2020,\n  author = {Smith, K.},\n  title = {Another},\n  year = 2020\n}\n",
        )?;

        project
            .command()?
            .arg("bib")
            .arg(&bib)
            .assert()
            .success()
            .stdout(predicate::str::contains("smith2020: A Long Title"))
            .stdout(predicate::str::contains("smith2020a: Another"))
            .stdout(predicate::str::contains("2 entries in refs.bib"));

        Ok(())
    }

    #[test]
    fn test_bib_missing_file() -> anyhow::Result<()> {
        let project = TestProject::new()?;

        project
            .command()?
            .arg("bib")
            .arg(project.path("none.bib"))
            .assert()
            .failure()
            .code(2);

        Ok(())
    }
}
