//! Run state models

use crate::core::task::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the stage driver is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// No stage has started
    NotStarted,
    /// A forward stage is executing
    RunningStage(Stage),
    /// A stage failed; forward progress stopped
    Failed(Stage),
    /// Best-effort cleanup after a failure
    RollingBack,
    /// All requested stages finished
    Done,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Failed(_) | RunState::Done)
    }

    /// Stage currently or last executed
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RunState::RunningStage(stage) | RunState::Failed(stage) => Some(*stage),
            _ => None,
        }
    }
}

/// How a single task ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Passed,
    Failed(String),
    /// Failed during rollback; logged and not counted against the run
    Suppressed(String),
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TaskOutcome::Passed => None,
            TaskOutcome::Failed(e) | TaskOutcome::Suppressed(e) => Some(e),
        }
    }
}

/// Summary of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub passed: Vec<String>,
    pub failed: Vec<String>,
    /// No task selected for the stage
    pub skipped: bool,
}

/// Summary of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub scenario: String,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageReport>,
    pub rolled_back: bool,
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            scenario: scenario.into(),
            state: RunState::NotStarted,
            started_at: None,
            completed_at: None,
            stages: Vec::new(),
            rolled_back: false,
            error: None,
        }
    }

    /// Stages that ran to completion without failed tasks
    pub fn passed_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|s| !s.skipped && s.failed.is_empty())
            .map(|s| s.stage)
            .collect()
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.stages.iter().filter(|s| !s.failed.is_empty()).map(|s| s.stage).collect()
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done && self.error.is_none()
    }

    /// 0 on success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}
