//! Stages, notification triggers and task records

use crate::core::config::TefloConfig;
use crate::error::{Result, TefloError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One of the six fixed pipeline phases, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validate,
    Provision,
    Orchestrate,
    Execute,
    Report,
    Cleanup,
}

impl Stage {
    /// The master stage list
    pub const ALL: [Stage; 6] = [
        Stage::Validate,
        Stage::Provision,
        Stage::Orchestrate,
        Stage::Execute,
        Stage::Report,
        Stage::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Provision => "provision",
            Stage::Orchestrate => "orchestrate",
            Stage::Execute => "execute",
            Stage::Report => "report",
            Stage::Cleanup => "cleanup",
        }
    }

    pub fn is_valid(name: &str) -> bool {
        name.parse::<Stage>().is_ok()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = TefloError;

    fn from_str(s: &str) -> Result<Self> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TefloError::InvalidTask(s.to_string()))
    }
}

/// Events that fire notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    OnStart,
    OnComplete,
    OnDemand,
}

impl Trigger {
    pub const ALL: [Trigger; 3] = [Trigger::OnStart, Trigger::OnComplete, Trigger::OnDemand];

    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::OnStart => "on_start",
            Trigger::OnComplete => "on_complete",
            Trigger::OnDemand => "on_demand",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = TefloError;

    fn from_str(s: &str) -> Result<Self> {
        Trigger::ALL
            .into_iter()
            .find(|trigger| trigger.as_str() == s.trim())
            .ok_or_else(|| TefloError::InvalidTask(s.to_string()))
    }
}

/// The kind of work a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskClass {
    Validate,
    Provision,
    Orchestrate,
    Execute,
    Report,
    Cleanup,
    Notify,
}

impl TaskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClass::Validate => "validate",
            TaskClass::Provision => "provision",
            TaskClass::Orchestrate => "orchestrate",
            TaskClass::Execute => "execute",
            TaskClass::Report => "report",
            TaskClass::Cleanup => "cleanup",
            TaskClass::Notify => "notify",
        }
    }

    /// Whether tasks of this class may run side by side unless configured otherwise
    pub fn default_concurrency(&self) -> bool {
        matches!(self, TaskClass::Validate | TaskClass::Provision | TaskClass::Notify)
    }

    pub fn default_timeout(&self) -> Duration {
        let secs = match self {
            TaskClass::Validate => 600,
            TaskClass::Provision | TaskClass::Orchestrate | TaskClass::Execute => 3600,
            TaskClass::Report | TaskClass::Cleanup => 1800,
            TaskClass::Notify => 300,
        };
        Duration::from_secs(secs)
    }

    /// Plugin calls a task of this class makes, in order
    pub fn methods(&self) -> Vec<&'static str> {
        match self {
            TaskClass::Validate => vec!["validate"],
            TaskClass::Provision => vec!["authenticate", "create"],
            TaskClass::Orchestrate => vec!["run"],
            TaskClass::Execute => vec!["run"],
            TaskClass::Report => vec!["validate_artifacts", "import_artifacts"],
            TaskClass::Cleanup => vec!["delete"],
            TaskClass::Notify => vec!["notify"],
        }
    }
}

impl From<Stage> for TaskClass {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Validate => TaskClass::Validate,
            Stage::Provision => TaskClass::Provision,
            Stage::Orchestrate => TaskClass::Orchestrate,
            Stage::Execute => TaskClass::Execute,
            Stage::Report => TaskClass::Report,
            Stage::Cleanup => TaskClass::Cleanup,
        }
    }
}

impl fmt::Display for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task a resource contributes to a pipeline
///
/// The package the task operates on is attached when a pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub class: TaskClass,
    pub name: String,
    pub methods: Vec<&'static str>,
    pub timeout: Duration,
    pub concurrent: bool,
}

impl TaskSpec {
    pub fn new(class: TaskClass, resource_name: &str, config: &TefloConfig) -> Self {
        Self {
            class,
            name: format!("{}:{}", class, resource_name),
            methods: class.methods(),
            timeout: config.timeout_for(class),
            concurrent: config.concurrency_for(class),
        }
    }
}

/// Build the task set for a resource: one task per stage it declares, in stage order
pub fn build_tasks(valid: &[TaskClass], resource_name: &str, config: &TefloConfig) -> Vec<TaskSpec> {
    Stage::ALL
        .into_iter()
        .map(TaskClass::from)
        .chain(std::iter::once(TaskClass::Notify))
        .filter(|class| valid.contains(class))
        .map(|class| TaskSpec::new(class, resource_name, config))
        .collect()
}
