//! Error taxonomy for scenario loading and stage execution

use thiserror::Error;

/// Why an `include:` entry could not be attached to the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeErrorKind {
    /// The include entry was an empty string
    Empty,
    /// None of the fallback locations contained the file
    Missing,
    /// The file is already attached somewhere in the graph
    Cycle,
}

impl std::fmt::Display for IncludeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncludeErrorKind::Empty => write!(f, "empty include path"),
            IncludeErrorKind::Missing => write!(f, "include not found"),
            IncludeErrorKind::Cycle => write!(f, "include cycle"),
        }
    }
}

/// Errors raised while building, validating or running a scenario
#[derive(Debug, Error)]
pub enum TefloError {
    #[error("cannot build {kind} '{name}': {message}")]
    ResourceConstruction {
        kind: String,
        name: String,
        message: String,
    },

    #[error("scenario descriptor {path} is invalid: {message}")]
    SchemaValidation { path: String, message: String },

    #[error("{kind} in {parent}: {message}")]
    GraphInclude {
        kind: IncludeErrorKind,
        parent: String,
        message: String,
    },

    #[error("labels {labels:?} do not match any resource in the scenario")]
    LabelMismatch { labels: Vec<String> },

    #[error("stage '{stage}' failed: {message}")]
    StageExecution {
        stage: String,
        failed_tasks: Vec<String>,
        message: String,
    },

    #[error("rollback cleanup failed: {0}")]
    Rollback(String),

    #[error("no {capability} plugin named '{name}'")]
    UnknownPlugin { capability: String, name: String },

    #[error("'{0}' is not a valid task")]
    InvalidTask(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not lock {path}: {message}")]
    Lock { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl TefloError {
    pub fn construction(kind: impl ToString, name: impl Into<String>, message: impl Into<String>) -> Self {
        TefloError::ResourceConstruction {
            kind: kind.to_string(),
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        TefloError::SchemaValidation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn include(kind: IncludeErrorKind, parent: impl Into<String>, message: impl Into<String>) -> Self {
        TefloError::GraphInclude {
            kind,
            parent: parent.into(),
            message: message.into(),
        }
    }

    /// Errors that abort a run before any stage executes
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            TefloError::ResourceConstruction { .. }
                | TefloError::SchemaValidation { .. }
                | TefloError::GraphInclude { .. }
                | TefloError::LabelMismatch { .. }
                | TefloError::UnknownPlugin { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TefloError>;
