//! Test projects and binary invocation
//!
//! Provides [`TestProject`], a LaTeX project tree in a temporary directory
//! with its own config and cache directories.

#![allow(dead_code)]

use assert_cmd::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub struct TestProject {
    pub dir: TempDir,
    pub home: TempDir,
}

impl TestProject {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            home: TempDir::new()?,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `content` to `name`, creating parent directories
    pub fn write(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.home.path().join("config")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.home.path().join("cache").join("texsense")
    }

    /// Replace the user settings with `json`
    pub fn write_settings(&self, json: &str) -> anyhow::Result<()> {
        let dir = self.config_dir().join("texsense");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("settings.json"), json)?;
        Ok(())
    }

    /// The texsense binary with isolated directories and colors off
    pub fn command(&self) -> anyhow::Result<Command> {
        let mut cmd = Command::cargo_bin("texsense")?;
        cmd.current_dir(self.dir.path())
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.config_dir())
            .env("XDG_CACHE_HOME", self.home.path().join("cache"))
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        Ok(cmd)
    }
}

/// Scenario: a root document including one chapter
pub fn create_book_project() -> anyhow::Result<TestProject> {
    let project = TestProject::new()?;
    project.write(
        "main.tex",
        "\\documentclass[11pt]{book}\n\
         \\usepackage{hyperref}\n\
         \\begin{document}\n\
         \\chapter{Intro}\\label{ch:intro}\n\
         See \\cite{knuth84}.\n\
         \\input{chapters/one}\n\
         \\bibliography{refs}\n\
         \\end{document}\n",
    )?;
    project.write(
        "chapters/one.tex",
        "% !TEX root = ../main.tex\n\\section{One}\\label{sec:one}\nAs in \\ref{ch:intro}.\n",
    )?;
    project.write(
        "refs.bib",
        "@Book{knuth84,\n  author = {Knuth, Donald E.},\n  title = {The TeXbook},\n  year = 1984\n}\n",
    )?;
    Ok(project)
}

/// Executable shell script `name` in `dir`
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> anyhow::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}
