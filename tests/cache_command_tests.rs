use assert_cmd::prelude::*;
use predicates::prelude::*;

mod common;
use common::{assertions, fixtures::*};

#[cfg(test)]
mod cache_command_tests {
    use super::*;

    #[test]
    fn test_cache_show_lists_known_categories() -> anyhow::Result<()> {
        let project = TestProject::new()?;

        project
            .command()?
            .args(["cache", "show"])
            .assert()
            .success()
            .stdout(assertions::has_section("Categories"))
            .stdout(predicate::str::contains("tex.cache"))
            .stdout(predicate::str::contains("bib.cache"))
            .stdout(predicate::str::contains("pkg.cache"));

        Ok(())
    }

    #[test]
    fn test_parse_results_are_persisted() -> anyhow::Result<()> {
        let project = create_book_project()?;

        project
            .command()?
            .arg("parse")
            .arg(project.path("main.tex"))
            .assert()
            .success();
        assert!(project.cache_dir().join("tex.cache").is_file());

        project
            .command()?
            .args(["cache", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 entries"));

        Ok(())
    }

    #[test]
    fn test_no_cache_leaves_disk_untouched() -> anyhow::Result<()> {
        let project = create_book_project()?;

        project
            .command()?
            .args(["--no-cache", "parse"])
            .arg(project.path("main.tex"))
            .assert()
            .success();
        assert!(!project.cache_dir().join("tex.cache").exists());

        Ok(())
    }

    #[test]
    fn test_hard_clear_removes_category_file() -> anyhow::Result<()> {
        let project = create_book_project()?;
        project
            .command()?
            .arg("parse")
            .arg(project.path("main.tex"))
            .assert()
            .success();

        project
            .command()?
            .args(["cache", "clear", "tex", "--hard"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed tex.cache"));
        assert!(!project.cache_dir().join("tex.cache").exists());

        Ok(())
    }

    #[test]
    fn test_refresh_reparses_cached_files() -> anyhow::Result<()> {
        let project = create_book_project()?;
        project
            .command()?
            .arg("parse")
            .arg(project.path("main.tex"))
            .assert()
            .success();

        project
            .command()?
            .args(["cache", "refresh", "tex.cache"])
            .assert()
            .success()
            .stdout(predicate::str::contains("tex.cache: 1 entries refreshed"));

        Ok(())
    }
}
