//! Process-wide settings and per-run options

use crate::core::task::{Stage, TaskClass};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Name of the settings file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "teflo.yml";

/// Settings loaded once at process start
///
/// After [`TefloConfig::finalize`] the value is shared behind an `Arc` and
/// only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TefloConfig {
    /// Root of all per-run data folders
    pub data_folder: PathBuf,

    /// Directory scenario descriptors and includes are resolved against
    pub workspace: PathBuf,

    /// Where results files and archived artifacts go
    pub results_folder: Option<PathBuf>,

    /// Where inventory files are written
    pub inventory_folder: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Per task class timeout overrides in seconds
    pub timeouts: BTreeMap<String, u64>,

    /// Per task class concurrency overrides
    pub task_concurrency: BTreeMap<String, bool>,

    pub default_orchestrator: String,
    pub default_executor: String,
    pub default_notifier: String,

    /// Extra directories searched for `teflo-plugin-<name>` executables
    pub plugin_path: Vec<PathBuf>,

    /// How long to wait for the inventory lock
    pub inventory_lock_timeout_secs: u64,

    /// Upper bound on tasks running at once in a concurrent pipeline (0 = no bound)
    pub max_parallel_tasks: usize,

    /// Identifier of the current run (generated by `finalize`)
    #[serde(skip)]
    pub run_id: String,
}

impl Default for TefloConfig {
    fn default() -> Self {
        Self {
            data_folder: PathBuf::from("/tmp/teflo"),
            workspace: PathBuf::from("."),
            results_folder: None,
            inventory_folder: None,
            log_level: "info".to_string(),
            timeouts: BTreeMap::new(),
            task_concurrency: BTreeMap::new(),
            default_orchestrator: "ansible".to_string(),
            default_executor: "runner".to_string(),
            default_notifier: "email-notifier".to_string(),
            plugin_path: Vec::new(),
            inventory_lock_timeout_secs: 60,
            max_parallel_tasks: 0,
            run_id: String::new(),
        }
    }
}

impl TefloConfig {
    /// Load settings from an explicit file or the default locations
    ///
    /// Lookup order: `path`, `./teflo.yml`, `<config dir>/teflo/teflo.yml`,
    /// built-in defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let local = PathBuf::from(CONFIG_FILE_NAME);
                if local.exists() {
                    Some(local)
                } else {
                    dirs::config_dir()
                        .map(|dir| dir.join("teflo").join(CONFIG_FILE_NAME))
                        .filter(|p| p.exists())
                }
            }
        };

        let mut config = match candidate {
            Some(file) => {
                debug!("Loading settings from {}", file.display());
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read settings file {}", file.display()))?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: TefloConfig = serde_yaml::from_str(yaml).context("Invalid settings file")?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(folder) = std::env::var("TEFLO_DATA_FOLDER") {
            self.data_folder = PathBuf::from(folder);
        }
        if let Ok(folder) = std::env::var("TEFLO_RESULTS_FOLDER") {
            self.results_folder = Some(PathBuf::from(folder));
        }
        if let Ok(level) = std::env::var("TEFLO_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Check that every override names a known task class
    pub fn validate(&self) -> Result<()> {
        for key in self.timeouts.keys().chain(self.task_concurrency.keys()) {
            if Self::class_for_key(key).is_none() {
                anyhow::bail!("Unknown task '{}' in settings", key);
            }
        }
        Ok(())
    }

    fn class_for_key(key: &str) -> Option<TaskClass> {
        if key.eq_ignore_ascii_case("notify") {
            return Some(TaskClass::Notify);
        }
        key.parse::<Stage>().ok().map(TaskClass::from)
    }

    fn override_for<T: Copy>(map: &BTreeMap<String, T>, class: TaskClass) -> Option<T> {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(class.as_str()))
            .map(|(_, value)| *value)
    }

    pub fn timeout_for(&self, class: TaskClass) -> Duration {
        Self::override_for(&self.timeouts, class)
            .map(Duration::from_secs)
            .unwrap_or_else(|| class.default_timeout())
    }

    pub fn concurrency_for(&self, class: TaskClass) -> bool {
        Self::override_for(&self.task_concurrency, class).unwrap_or_else(|| class.default_concurrency())
    }

    /// Generate the run id and create the per-run folders
    ///
    /// Derived paths (results and inventory folders) are filled in here.
    pub fn finalize(mut self) -> Result<Self> {
        if self.run_id.is_empty() {
            let id = uuid::Uuid::new_v4().simple().to_string();
            self.run_id = id[..10].to_string();
        }
        if self.results_folder.is_none() {
            self.results_folder = Some(self.data_folder.join(".results"));
        }
        if self.inventory_folder.is_none() {
            self.inventory_folder = Some(self.results_folder().join("inventory"));
        }
        std::fs::create_dir_all(self.run_dir())
            .with_context(|| format!("Failed to create data folder {}", self.run_dir().display()))?;
        std::fs::create_dir_all(self.results_folder())?;
        Ok(self)
    }

    /// Per-run data folder
    pub fn run_dir(&self) -> PathBuf {
        self.data_folder.join(&self.run_id)
    }

    pub fn results_folder(&self) -> PathBuf {
        self.results_folder
            .clone()
            .unwrap_or_else(|| self.data_folder.join(".results"))
    }

    pub fn inventory_folder(&self) -> PathBuf {
        self.inventory_folder
            .clone()
            .unwrap_or_else(|| self.results_folder().join("inventory"))
    }

    /// Where remote workspaces are cloned
    pub fn remote_workspace_dir(&self) -> PathBuf {
        self.data_folder.join(".remote")
    }

    pub fn log_file(&self) -> PathBuf {
        self.run_dir().join("teflo_scenario.log")
    }
}

/// Order in which the scenario graph is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    /// Deepest level first, root last
    #[default]
    ByLevel,
    /// Post-order depth first, children left to right before their parent
    ByDepth,
}

/// Options of a single `run` invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Requested stages (empty means all)
    pub stages: Vec<Stage>,

    /// Only resources carrying one of these labels are selected
    pub labels: Vec<String>,

    /// Resources carrying one of these labels are skipped
    pub skip_labels: Vec<String>,

    /// Disable all notifications
    pub no_notify: bool,

    /// Names of notifications to leave out
    pub skip_notify: Vec<String>,

    pub order: TraversalOrder,
}

impl RunOptions {
    pub fn with_stages(stages: &[Stage]) -> Self {
        Self {
            stages: stages.to_vec(),
            ..Default::default()
        }
    }

    /// Requested stages in master list order, without duplicates
    pub fn ordered_stages(&self) -> Vec<Stage> {
        if self.stages.is_empty() {
            return Stage::ALL.to_vec();
        }
        Stage::ALL
            .into_iter()
            .filter(|stage| self.stages.contains(stage))
            .collect()
    }

    pub fn wants(&self, stage: Stage) -> bool {
        self.ordered_stages().contains(&stage)
    }
}
