//! Compiler orchestration.
//!
//! A build resolves the root of the edited file, writes the partial
//! document when needed, runs the configured builder on a worker thread,
//! parses the log and publishes the diagnostics. At most one build runs per
//! root file; a second request terminates the first or is refused,
//! depending on `build.on_running`.

use crate::core::bib::{fill_placeholders, BibEntry};
use crate::core::bib_file::BibFile;
use crate::core::config::{Context, OnRunning};
use crate::core::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, DiagnosticsSink, UserNotifier};
use crate::core::dirs::collapse_home;
use crate::core::error::{Result, TexSenseError};
use crate::core::log_parser::LogParser;
use crate::core::paths::{add_extension, relative_to, remove_extension};
use crate::core::process::{find_executable, search_path, CancelHandle, CommandSpec, ProcessRunner};
use crate::core::remote::{find_remote_cites, RemoteLibrary};
use crate::core::source_check::{check_linked_bib_files, check_remote_bib_file};
use crate::core::tex_data::{Category, Occurrence};
use crate::core::tex_file::TexFile;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const PARTIAL_EXTENSION: &str = ".ptex";

const LOG_OPEN_FAILED: &str = "Could not open log file, please check your system. Be sure you are using the latest version of your LaTeX distribution.";
const COPY_FAILED: &str = "Could not move the pdf or synctex file. Close the pdf viewer to reset the file access or other permission problems.";

lazy_static! {
    static ref RE_PARTIAL_MARKER: Regex = Regex::new(r"%\s*\(PARTIAL\)").unwrap();
    static ref RE_BIBLIOGRAPHY_STYLE: Regex = Regex::new(r"\\bibliographystyle\{(?P<style>.+?)\}").unwrap();
    static ref RE_UNDEFINED_REFERENCE: Regex = Regex::new(r"Reference\s.+?\sundefined").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Compile the root file
    Default,
    /// Compile only the edited file inside the root's preamble
    Partial,
}

// === Build registry ===

struct BuildSlot {
    cancel: CancelHandle,
    finished: Mutex<bool>,
    signal: Condvar,
}

impl BuildSlot {
    fn new() -> Self {
        Self {
            cancel: CancelHandle::default(),
            finished: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut finished = self.finished.lock().unwrap_or_else(|p| p.into_inner());
        while !*finished {
            finished = self.signal.wait(finished).unwrap_or_else(|p| p.into_inner());
        }
    }

    fn mark_finished(&self) {
        *self.finished.lock().unwrap_or_else(|p| p.into_inner()) = true;
        self.signal.notify_all();
    }
}

/// Running builds, keyed by root file
#[derive(Default)]
pub struct BuildRegistry {
    running: Mutex<HashMap<PathBuf, Arc<BuildSlot>>>,
}

/// Holds a registry slot until dropped
struct SlotGuard {
    registry: Arc<BuildRegistry>,
    root: PathBuf,
    slot: Arc<BuildSlot>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut running = self.registry.running.lock().unwrap_or_else(|p| p.into_inner());
        if running.get(&self.root).is_some_and(|s| Arc::ptr_eq(s, &self.slot)) {
            running.remove(&self.root);
        }
        drop(running);
        self.slot.mark_finished();
    }
}

impl BuildRegistry {
    pub fn is_running(&self, root: &Path) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(root)
    }

    /// Reserve `root`, terminating or refusing a build already running
    fn acquire(self: &Arc<Self>, root: &Path, policy: OnRunning) -> Result<SlotGuard> {
        loop {
            let existing = {
                let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
                match running.get(root) {
                    Some(slot) => slot.clone(),
                    None => {
                        let slot = Arc::new(BuildSlot::new());
                        running.insert(root.to_path_buf(), slot.clone());
                        return Ok(SlotGuard {
                            registry: self.clone(),
                            root: root.to_path_buf(),
                            slot,
                        });
                    }
                }
            };

            match policy {
                OnRunning::Refuse => return Err(TexSenseError::build_in_progress(root)),
                OnRunning::Terminate => {
                    log::info!("Terminating running build of {}", root.display());
                    existing.cancel.cancel();
                    existing.wait();
                }
            }
        }
    }
}

// === Partial documents ===

/// The root preamble around `body`.
///
/// The preamble ends at a `% (PARTIAL)` marker, else right after
/// `\begin{document}`; the document is closed by the root's own
/// `\end{document}` and whatever follows it.
pub fn partial_source(root_content: &str, body: &str) -> String {
    let mut begin = match RE_PARTIAL_MARKER.find(root_content) {
        Some(marker) => root_content[..marker.start()].trim().to_string(),
        None => match root_content.find("\\begin{document}") {
            Some(start) => root_content[..start + "\\begin{document}".len()].trim().to_string(),
            None => root_content.trim().to_string(),
        },
    };
    if !begin.contains("\\begin{document}") {
        begin.push_str("\n\\begin{document}");
    }

    let end = match root_content.find("\\end{document}") {
        Some(start) => root_content[start..].trim(),
        None => "\\end{document}",
    };

    format!("{begin}\n{body}\n{end}")
}

/// Drop warnings about labels the edited file defines, and the summary
/// warning once no undefined reference is left
pub fn filter_partial_warnings(warnings: Vec<Diagnostic>, labels: &[String]) -> Vec<Diagnostic> {
    let labels: Vec<&str> = labels
        .iter()
        .map(|label| label.split_once(':').map(|(_, name)| name).unwrap_or(label))
        .filter(|name| !name.is_empty())
        .collect();

    let mut warnings: Vec<Diagnostic> = warnings
        .into_iter()
        .filter(|w| !labels.iter().any(|label| w.message.contains(label)))
        .collect();

    if !warnings.iter().any(|w| RE_UNDEFINED_REFERENCE.is_match(&w.message)) {
        warnings.retain(|w| !w.message.contains("There were undefined references."));
    }
    warnings
}

// === Build plans ===

/// Paths of one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub mode: BuildMode,
    pub root: PathBuf,
    /// File handed to the compiler
    pub file: PathBuf,
    pub output_directory: PathBuf,
    /// Job name, the pdf name without extension
    pub job: String,
    pub log_path: PathBuf,
    pub pdf: (PathBuf, PathBuf),
    pub synctex: Option<(PathBuf, PathBuf)>,
    /// Deleted after the build
    pub clean: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub plan: BuildPlan,
    pub diagnostics: Diagnostics,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        !self.cancelled && !self.diagnostics.has_errors()
    }
}

pub struct BuildHandle {
    root: PathBuf,
    cancel: CancelHandle,
    worker: JoinHandle<Result<BuildOutcome>>,
}

impl BuildHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Kill the compiler process, if one is running
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn wait(self) -> Result<BuildOutcome> {
        self.worker
            .join()
            .unwrap_or_else(|_| Err(TexSenseError::compiler_failure("build worker panicked")))
    }
}

/// Builds documents with the configured builder
#[derive(Clone)]
pub struct Compiler {
    ctx: Context,
    runner: Arc<dyn ProcessRunner>,
    sink: Arc<dyn DiagnosticsSink>,
    notifier: Arc<dyn UserNotifier>,
    libraries: Arc<Mutex<Vec<RemoteLibrary>>>,
    registry: Arc<BuildRegistry>,
}

impl Compiler {
    pub fn new(
        ctx: &Context,
        runner: Arc<dyn ProcessRunner>,
        sink: Arc<dyn DiagnosticsSink>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self {
            ctx: ctx.clone(),
            runner,
            sink,
            notifier,
            libraries: Arc::new(Mutex::new(Vec::new())),
            registry: Arc::new(BuildRegistry::default()),
        }
    }

    /// Remote libraries consulted before each build
    pub fn with_libraries(mut self, libraries: Vec<RemoteLibrary>) -> Self {
        self.libraries = Arc::new(Mutex::new(libraries));
        self
    }

    pub fn registry(&self) -> &BuildRegistry {
        &self.registry
    }

    /// Start building `file` on a worker thread.
    ///
    /// Fails straight away for generated partial documents, a missing
    /// builder executable, or a refused concurrent build.
    pub fn build(&self, file: &Path) -> Result<BuildHandle> {
        let mut tex = TexFile::new(&self.ctx, file);
        if tex.extension() == PARTIAL_EXTENSION {
            return Err(TexSenseError::GeneratedSource {
                path: tex.path().to_path_buf(),
            });
        }
        tex.run(true, false)?;
        let root = tex.root_file_path();

        let template = self.ctx.settings.build.command();
        let program = template
            .first()
            .ok_or_else(|| TexSenseError::executable_not_found(&self.ctx.settings.build.builder))?;
        let program = find_executable(&self.ctx.settings.build, program)?;

        let guard = self.registry.acquire(&root, self.ctx.settings.build.on_running)?;
        let cancel = guard.slot.cancel.clone();
        let compiler = self.clone();
        let file = tex.path().to_path_buf();
        let worker = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                let _guard = guard;
                compiler.execute(&file, &program, &template, &cancel)
            })
        };

        Ok(BuildHandle { root, cancel, worker })
    }

    /// Build synchronously on the calling thread
    pub fn build_blocking(&self, file: &Path) -> Result<BuildOutcome> {
        self.build(file)?.wait()
    }

    fn plan(&self, tex: &mut TexFile, root: &mut TexFile) -> Result<BuildPlan> {
        let partial = self.ctx.settings.build.partial_build && tex.path() != root.path();
        let root_dir = root.dir();
        let pdf_name = root.pdf_file_name();
        let job = pdf_name.strip_suffix(".pdf").unwrap_or(&pdf_name).to_string();
        let synctex = self.ctx.settings.build.synctex();

        let (mode, file, output_directory) = if partial {
            let file = root_dir.join(format!("{}{PARTIAL_EXTENSION}", root.stem()));
            std::fs::write(&file, self.partial_document(tex, root)?)?;
            let sub = format!("partial/{}", tex.stem());
            (BuildMode::Partial, file, tex.output_directory(Some(&sub)))
        } else {
            (BuildMode::Default, root.path().to_path_buf(), root.output_directory(None))
        };

        let mut clean = Vec::new();
        if root_dir != output_directory {
            clean.push(root_dir.join(add_extension(&job, ".fls")));
        }
        if !synctex {
            clean.push(root_dir.join(add_extension(&job, ".synctex.gz")));
        }
        if mode == BuildMode::Default {
            clean.push(root_dir.join(format!("{}{PARTIAL_EXTENSION}", root.stem())));
        }

        let synctex_name = add_extension(&job, ".synctex.gz");
        Ok(BuildPlan {
            mode,
            root: root.path().to_path_buf(),
            log_path: output_directory.join(add_extension(&job, ".log")),
            pdf: (output_directory.join(&pdf_name), root_dir.join(&pdf_name)),
            synctex: synctex.then(|| (output_directory.join(&synctex_name), root_dir.join(&synctex_name))),
            file,
            output_directory,
            job,
            clean,
        })
    }

    fn partial_document(&self, tex: &mut TexFile, root: &mut TexFile) -> Result<String> {
        let root_dir = root.dir();
        let relative = relative_to(tex.path(), &root_dir);
        let include = match tex.documentclass(false) {
            Some(class) if class.name == "subfiles" => format!("\\subfile{{{relative}}}"),
            _ => format!("\\input{{{relative}}}"),
        };

        let root_content = std::fs::read_to_string(root.path())?;
        let cites = !tex.get(Category::Cite, false).is_empty();
        let biblatex = root
            .get(Category::Packages, true)
            .iter()
            .any(|(_, o)| matches!(o, Occurrence::Package(name) if name == "biblatex"));

        let bibliography = if !cites {
            String::new()
        } else if biblatex {
            "\n\\printbibliography".to_string()
        } else {
            let style = RE_BIBLIOGRAPHY_STYLE
                .captures(&root_content)
                .map(|c| c["style"].to_string())
                .unwrap_or_else(|| "plain".to_string());
            let extension = &self.ctx.settings.default_bib_extension;
            let files: Vec<String> = root
                .bibliography()
                .iter()
                .map(|path| {
                    let path = path.to_string_lossy();
                    relative_to(Path::new(remove_extension(&path, extension)), &root_dir)
                })
                .collect();
            format!("\n\\bibliographystyle{{{style}}}\n\\bibliography{{{}}}", files.join(","))
        };

        Ok(partial_source(&root_content, &format!("{include}{bibliography}")))
    }

    fn command(&self, plan: &BuildPlan, tex: &mut TexFile, program: &Path, template: &[String]) -> CommandSpec {
        let settings = &self.ctx.settings.build;
        let values = [
            ("file", plan.file.to_string_lossy().into_owned()),
            (
                "filebase",
                plan.output_directory.join(&plan.job).to_string_lossy().into_owned(),
            ),
            ("pdfname", plan.job.clone()),
            ("outdir", plan.output_directory.to_string_lossy().into_owned()),
            ("synctex", if settings.synctex() { "1" } else { "0" }.to_string()),
        ];

        let mut args: Vec<String> = settings.build_arguments.clone();
        let is_latexmk = program
            .file_name()
            .is_some_and(|name| name.to_string_lossy().contains("latexmk"));
        if is_latexmk {
            match tex.get_option("program", None).as_deref() {
                Some("lualatex") => args.insert(0, "-pdflatex=lualatex".to_string()),
                Some("xelatex") => args.insert(0, "-pdflatex=xelatex".to_string()),
                _ => {}
            }
        }
        args.extend(template.iter().skip(1).map(|arg| fill_placeholders(arg, &values)));

        let mut spec = CommandSpec::new(program, args, plan.root.parent().unwrap_or(Path::new(".")));
        spec.search_path = Some(search_path(settings));
        spec
    }

    /// Offer to rewrite entries of the remote bibliography file that
    /// differ from the remote records
    fn update_remote_bibliography(&self, tex: &mut TexFile) {
        if !self.ctx.settings.update_remote_bibliography {
            return;
        }
        let remote: HashMap<String, _> = {
            let mut libraries = self.libraries.lock().unwrap_or_else(|p| p.into_inner());
            if libraries.is_empty() {
                return;
            }
            find_remote_cites(&mut libraries, &[])
                .into_iter()
                .map(|entry| (entry.key.clone(), entry))
                .collect()
        };
        if remote.is_empty() {
            return;
        }

        let mut bib_file = BibFile::new(&self.ctx, tex.root_file().dir().join(&self.ctx.settings.bibname));
        if let Err(e) = bib_file.run(true, false) {
            log::debug!("{e}");
            return;
        }

        let mut changed = Vec::new();
        for key in bib_file.cite_keys() {
            let Some(entry) = remote.get(&key) else {
                continue;
            };
            if changed.iter().any(|c: &BibEntry| c.key == key) {
                continue;
            }
            if bib_file.cite_source(&key).as_deref() != Some(entry.to_plain().as_str()) {
                log::debug!("{key} differs from the remote record");
                changed.push(entry.clone());
            }
        }
        if changed.is_empty() {
            return;
        }

        let question = format!(
            "{} Citation(s) in {} have been updated in your remote bibliography, update the item(s) prior the typeset?",
            changed.len(),
            bib_file.file_name()
        );
        if self.notifier.confirm(&question, "Update") {
            if let Err(e) = bib_file.update_cites(&changed) {
                log::error!("{e}");
                self.notifier.message(&e.to_string());
            }
        }
    }

    fn save_output(&self, plan: &BuildPlan, stream: &str, content: &str) {
        if content.is_empty() {
            return;
        }
        let path = plan.output_directory.join(format!("{}.{stream}.log", plan.job));
        if let Err(e) = std::fs::write(&path, content) {
            log::warn!("Failed to save {}: {e}", path.display());
        }
    }

    fn finish_files(&self, plan: &BuildPlan) {
        for path in plan.clean.iter().filter(|p| p.exists()) {
            match std::fs::remove_file(path) {
                Ok(()) => log::debug!("removed {}", path.display()),
                Err(e) => log::warn!("Failed to remove {}: {e}", path.display()),
            }
        }

        let copies = plan.synctex.iter().chain(std::iter::once(&plan.pdf));
        for (src, dst) in copies {
            if src == dst || !src.exists() {
                continue;
            }
            if let Err(e) = std::fs::copy(src, dst) {
                log::error!("Failed to copy {}: {e}", src.display());
                self.notifier.message(COPY_FAILED);
                return;
            }
        }
    }

    fn execute(&self, file: &Path, program: &Path, template: &[String], cancel: &CancelHandle) -> Result<BuildOutcome> {
        let started = Instant::now();
        let mut tex = TexFile::new(&self.ctx, file);
        let mut root = tex.root_file();
        root.run(true, false)?;

        let plan = self.plan(&mut tex, &mut root)?;
        let suffix = if plan.mode == BuildMode::Partial { " Partial" } else { "" };
        self.sink
            .publish(&[format!("[Compile {}{suffix}]", collapse_home(&plan.root))]);
        log::info!("output directory: {}", plan.output_directory.display());
        log::info!("job: {}", plan.job);

        self.update_remote_bibliography(&mut tex);

        let mut diagnostics = Diagnostics::default();
        for warning in check_remote_bib_file(&self.ctx, &mut root)
            .into_iter()
            .chain(check_linked_bib_files(&self.ctx, &mut root))
        {
            diagnostics.push(warning);
        }

        let command = self.command(&plan, &mut tex, program, template);
        log::info!("cmd: {}", command.display());
        let mut cancelled = false;
        match self.runner.run(&command, cancel) {
            Ok(output) if output.cancelled => cancelled = true,
            Ok(output) => {
                if self.ctx.settings.build.save_process_output {
                    self.save_output(&plan, "stdout", &output.stdout);
                    self.save_output(&plan, "stderr", &output.stderr);
                }
            }
            Err(e) => {
                log::error!("{e}");
                diagnostics.errors = vec![Diagnostic::synthetic(
                    DiagnosticKind::Error,
                    TexSenseError::compiler_failure(command.display()).to_string(),
                )];
            }
        }

        if cancelled {
            log::info!("Build of {} was terminated", plan.root.display());
            return Ok(BuildOutcome {
                plan,
                diagnostics,
                cancelled,
                elapsed: started.elapsed(),
            });
        }

        if !diagnostics.has_errors() {
            match LogParser::parse_file(&plan.file, &plan.log_path) {
                Ok(mut parsed) => {
                    if plan.mode == BuildMode::Partial {
                        let labels: Vec<String> = tex
                            .get(Category::Label, false)
                            .iter()
                            .filter_map(|(_, o)| o.as_command())
                            .filter_map(|c| c.arguments.first().map(|a| a.content.clone()))
                            .collect();
                        parsed.warnings = filter_partial_warnings(parsed.warnings, &labels);
                    }
                    diagnostics.extend(parsed);
                }
                Err(e) => {
                    log::error!("{}: {e}", plan.log_path.display());
                    diagnostics.push(Diagnostic::synthetic(DiagnosticKind::Error, LOG_OPEN_FAILED));
                }
            }
        }

        let elapsed = started.elapsed();
        self.sink.publish(&diagnostics.report(elapsed));
        self.finish_files(&plan);

        Ok(BuildOutcome {
            plan,
            diagnostics,
            cancelled,
            elapsed,
        })
    }
}
