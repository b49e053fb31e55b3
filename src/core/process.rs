//! Locating and running external command line tools.

use crate::core::config::BuildSettings;
use crate::core::error::{Result, TexSenseError};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configured directories followed by the inherited `PATH`
pub fn search_path(settings: &BuildSettings) -> OsString {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let mut dirs: Vec<PathBuf> = settings.path.clone();
    dirs.extend(std::env::split_paths(&inherited));
    match std::env::join_paths(dirs) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("Ignoring configured path {:?}: {e}", settings.path);
            inherited
        }
    }
}

fn candidate_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = dir.join(name);
    if path.is_file() {
        return Some(path);
    }
    if cfg!(windows) {
        let exe = dir.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
    }
    None
}

fn resolve(candidate: &str, search: &OsString) -> Option<PathBuf> {
    let path = Path::new(candidate);
    if path.components().count() > 1 {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        // Full paths from another machine's settings
        let base = path.file_name()?.to_string_lossy().into_owned();
        return resolve(&base, search);
    }
    std::env::split_paths(search).find_map(|dir| candidate_in(&dir, candidate))
}

/// Find the executable for the tool `name`.
///
/// Candidates come from `executables[name]`, defaulting to `name` itself.
pub fn find_executable(settings: &BuildSettings, name: &str) -> Result<PathBuf> {
    let search = search_path(settings);
    let default = vec![name.to_string()];
    let candidates = settings.executables.get(name).unwrap_or(&default);

    for candidate in candidates {
        if let Some(found) = resolve(candidate, &search) {
            log::debug!("{name}: {}", found.display());
            return Ok(found);
        }
        log::debug!("{name}: '{candidate}' not found");
    }
    Err(TexSenseError::executable_not_found(name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Value for `PATH` in the child environment
    pub search_path: Option<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
            search_path: None,
        }
    }

    /// Shell-like rendering for messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub cancelled: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.cancelled
    }
}

/// Shared handle through which a running process can be killed
#[derive(Clone, Default)]
pub struct CancelHandle {
    child: Arc<Mutex<Option<Child>>>,
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let mut child = self.child.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(child) = child.as_mut() {
            if let Err(e) = child.kill() {
                log::debug!("kill: {e}");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub trait ProcessRunner: Send + Sync {
    /// Run to completion, capturing stdout and stderr in full
    fn run(&self, command: &CommandSpec, cancel: &CancelHandle) -> Result<ProcessOutput>;
}

/// [`ProcessRunner`] backed by [`std::process::Command`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

fn drain(mut stream: impl Read + Send + 'static) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Err(e) = stream.read_to_end(&mut buffer) {
            log::debug!("read: {e}");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &CommandSpec, cancel: &CancelHandle) -> Result<ProcessOutput> {
        log::debug!("cmd {}", command.display());

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(path) = &command.search_path {
            cmd.env("PATH", path);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| TexSenseError::compiler_failure(format!("{}: {e}", command.display())))?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        *cancel.child.lock().unwrap_or_else(|p| p.into_inner()) = Some(child);
        if cancel.is_cancelled() {
            cancel.cancel();
        }

        let status = loop {
            let mut guard = cancel.child.lock().unwrap_or_else(|p| p.into_inner());
            let Some(child) = guard.as_mut() else {
                break None;
            };
            match child.try_wait()? {
                Some(status) => {
                    guard.take();
                    break Some(status);
                }
                None => {
                    drop(guard);
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        };

        let collect = |handle: Option<std::thread::JoinHandle<String>>| {
            handle.and_then(|h| h.join().ok()).unwrap_or_default()
        };
        Ok(ProcessOutput {
            code: status.and_then(|s| s.code()),
            stdout: collect(stdout),
            stderr: collect(stderr),
            cancelled: cancel.is_cancelled(),
        })
    }
}
