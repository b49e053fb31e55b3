use crate::core::cache::CacheStore;
use crate::core::dirs::get_config_directory;
use crate::core::error::{Result, TexSenseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputDirectoryMode {
    /// `Output/` beside the root file
    #[default]
    Flat,
    /// Job-named directory below the system temp directory
    Temp,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnRunning {
    /// Kill the running compiler and start over
    #[default]
    Terminate,
    Refuse,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PhraseSettings {
    pub enabled: bool,
    pub min_count: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub bounding_words: Vec<String>,
}

impl Default for PhraseSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_count: 2,
            min_length: 3,
            max_length: 5,
            bounding_words: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BuildSettings {
    /// Builder name to argument template
    pub builders: BTreeMap<String, Vec<String>>,
    pub builder: String,
    pub build_arguments: Vec<String>,
    pub forward_sync: bool,
    pub reverse_sync: bool,
    pub save_process_output: bool,
    pub partial_build: bool,
    /// Executable name to candidate names or full paths
    pub executables: BTreeMap<String, Vec<String>>,
    /// Directories searched before `PATH`
    pub path: Vec<PathBuf>,
    pub on_running: OnRunning,
}

impl Default for BuildSettings {
    fn default() -> Self {
        let latexmk = [
            "latexmk",
            "-pdf",
            "-interaction=nonstopmode",
            "-synctex={synctex}",
            "-jobname={pdfname}",
            "-outdir={outdir}",
            "{file}",
        ];
        Self {
            builders: BTreeMap::from([(
                "latexmk".to_string(),
                latexmk.iter().map(|s| s.to_string()).collect(),
            )]),
            builder: "latexmk".to_string(),
            build_arguments: Vec::new(),
            forward_sync: false,
            reverse_sync: false,
            save_process_output: false,
            partial_build: false,
            executables: BTreeMap::new(),
            path: Vec::new(),
            on_running: OnRunning::default(),
        }
    }
}

impl BuildSettings {
    pub fn synctex(&self) -> bool {
        self.forward_sync || self.reverse_sync
    }

    /// Argument template of the selected builder
    pub fn command(&self) -> Vec<String> {
        self.builders
            .get(&self.builder)
            .cloned()
            .unwrap_or_else(|| vec![self.builder.clone()])
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CheckSource {
    pub local_bibliography: bool,
    pub remote_bibliography: bool,
}

impl Default for CheckSource {
    fn default() -> Self {
        Self {
            local_bibliography: true,
            remote_bibliography: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Max age in hours per cache category, `0` disables caching
    pub cache: BTreeMap<String, u64>,
    pub cache_save_delay_secs: u64,
    pub default_tex_extension: String,
    pub default_bib_extension: String,
    pub output_directory: bool,
    pub output_directory_mode: OutputDirectoryMode,
    pub phrases: PhraseSettings,
    pub build: BuildSettings,
    pub bibname: String,
    pub update_remote_bibliography: bool,
    pub check_source: CheckSource,
    pub cite_key_blacklist: Vec<String>,
    pub cite_key_pattern: String,
    pub internal_cite_key: bool,
    pub cite_panel_format: Vec<String>,
}

pub const DEFAULT_CACHE_HOURS: u64 = 24;

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: BTreeMap::new(),
            cache_save_delay_secs: 300,
            default_tex_extension: ".tex".to_string(),
            default_bib_extension: ".bib".to_string(),
            output_directory: true,
            output_directory_mode: OutputDirectoryMode::default(),
            phrases: PhraseSettings::default(),
            build: BuildSettings::default(),
            bibname: "Remote.bib".to_string(),
            update_remote_bibliography: true,
            check_source: CheckSource::default(),
            cite_key_blacklist: Vec::new(),
            cite_key_pattern: "{Author}{year}".to_string(),
            internal_cite_key: false,
            cite_panel_format: vec!["{key}: {title}".to_string(), "#{type} by {author}".to_string()],
        }
    }
}

impl Settings {
    pub fn load_or_create() -> Result<Self> {
        let config_file = get_config_directory()?.join(SETTINGS_FILE);

        if config_file.exists() {
            Self::load_from(&config_file)
        } else {
            let settings = Self::default();
            settings.save()?;
            Ok(settings)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| TexSenseError::settings_parse_failed(path, e))
    }

    pub fn save(&self) -> Result<()> {
        let config_dir = get_config_directory()?;
        std::fs::create_dir_all(&config_dir)?;

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_dir.join(SETTINGS_FILE), content)?;

        Ok(())
    }

    /// Max cache age for a category name like `tex` or `zotero`
    pub fn cache_hours(&self, category: &str) -> u64 {
        self.cache.get(category).copied().unwrap_or(DEFAULT_CACHE_HOURS)
    }
}

/// Project-level overrides, `{"options": {...}}` beside a project file
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ProjectSettings {
    #[serde(skip)]
    pub project_dir: PathBuf,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ProjectSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut project: Self = serde_json::from_str(&content)
            .map_err(|e| TexSenseError::settings_parse_failed(path, e))?;
        project.project_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(project)
    }

    /// The project root, when it names a file that exists
    pub fn root(&self, default_extension: &str) -> Option<PathBuf> {
        let name = self.options.get("root")?;
        let name = if Path::new(name).extension().is_none() {
            format!("{name}{default_extension}")
        } else {
            name.clone()
        };
        let path = crate::core::paths::normalize(&self.project_dir.join(name));
        path.is_file().then_some(path)
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Shared services handed to every component
#[derive(Clone)]
pub struct Context {
    pub cache: Arc<dyn CacheStore>,
    pub settings: Arc<Settings>,
    pub project: Option<Arc<ProjectSettings>>,
}

impl Context {
    pub fn new(cache: Arc<dyn CacheStore>, settings: Settings) -> Self {
        Self {
            cache,
            settings: Arc::new(settings),
            project: None,
        }
    }

    pub fn with_project(mut self, project: ProjectSettings) -> Self {
        self.project = Some(Arc::new(project));
        self
    }

    /// Project override for `root`, else `fallback`
    pub fn project_root(&self, fallback: PathBuf) -> PathBuf {
        self.project
            .as_ref()
            .and_then(|p| p.root(&self.settings.default_tex_extension))
            .unwrap_or(fallback)
    }

    /// Project override for any other option key
    pub fn project_option(&self, key: &str) -> Option<String> {
        self.project.as_ref()?.option(key).map(str::to_string)
    }
}
