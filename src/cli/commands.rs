//! CLI command definitions

use crate::core::{RunOptions, Stage, TraversalOrder};
use clap::Args;
use std::path::PathBuf;

/// Where the scenario comes from and how it is rendered
#[derive(Debug, Args, Clone)]
pub struct ScenarioArgs {
    /// Path to the scenario descriptor
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Template variables: YAML files, directories of YAML files or key=value pairs
    #[arg(long = "vars-data")]
    pub vars_data: Vec<String>,

    /// Directory includes are resolved against
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Root folder for run data
    #[arg(short, long = "data-folder")]
    pub data_folder: Option<PathBuf>,
}

/// Resource selection by label
#[derive(Debug, Args, Clone, Default)]
pub struct LabelArgs {
    /// Only run resources carrying one of these labels
    #[arg(short, long, value_delimiter = ',', conflicts_with = "skip_labels")]
    pub labels: Vec<String>,

    /// Skip resources carrying one of these labels
    #[arg(long = "skip-labels", value_delimiter = ',')]
    pub skip_labels: Vec<String>,
}

/// Run scenario stages
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Stages to run (default: all)
    #[arg(short, long, value_delimiter = ',', value_parser = parse_stage)]
    pub tasks: Vec<Stage>,

    #[command(flatten)]
    pub labels: LabelArgs,

    /// Disable all notifications
    #[arg(long)]
    pub no_notify: bool,

    /// Notifications to leave out, by name
    #[arg(long = "skip-notify", value_delimiter = ',')]
    pub skip_notify: Vec<String>,

    /// Graph traversal order
    #[arg(long, value_enum, default_value_t = OrderArg::ByLevel)]
    pub order: OrderArg,
}

impl RunCommand {
    pub fn options(&self) -> RunOptions {
        RunOptions {
            stages: self.tasks.clone(),
            labels: self.labels.labels.clone(),
            skip_labels: self.labels.skip_labels.clone(),
            no_notify: self.no_notify,
            skip_notify: self.skip_notify.clone(),
            order: self.order.into(),
        }
    }
}

/// Fire on-demand notifications
#[derive(Debug, Args, Clone)]
pub struct NotifyCommand {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    #[command(flatten)]
    pub labels: LabelArgs,

    /// Notifications to leave out, by name
    #[arg(long = "skip-notify", value_delimiter = ',')]
    pub skip_notify: Vec<String>,
}

impl NotifyCommand {
    pub fn options(&self) -> RunOptions {
        RunOptions {
            labels: self.labels.labels.clone(),
            skip_labels: self.labels.skip_labels.clone(),
            skip_notify: self.skip_notify.clone(),
            ..Default::default()
        }
    }
}

/// Run only the validate stage
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    #[command(flatten)]
    pub labels: LabelArgs,
}

impl ValidateCommand {
    pub fn options(&self) -> RunOptions {
        RunOptions {
            stages: vec![Stage::Validate],
            labels: self.labels.labels.clone(),
            skip_labels: self.labels.skip_labels.clone(),
            no_notify: true,
            ..Default::default()
        }
    }
}

/// Print the resources of a scenario
#[derive(Debug, Args, Clone)]
pub struct ShowCommand {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Only list the labels in use
    #[arg(long)]
    pub list_labels: bool,

    /// Print the stage pipelines that a run would build
    #[arg(long)]
    pub pipelines: bool,

    #[command(flatten)]
    pub labels: LabelArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print the scenario graph
#[derive(Debug, Args, Clone)]
pub struct GraphCommand {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Graph traversal order
    #[arg(long, value_enum, default_value_t = OrderArg::ByLevel)]
    pub order: OrderArg,
}

/// Traversal order argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OrderArg {
    #[clap(name = "by_level")]
    ByLevel,
    #[clap(name = "by_depth")]
    ByDepth,
}

impl From<OrderArg> for TraversalOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::ByLevel => TraversalOrder::ByLevel,
            OrderArg::ByDepth => TraversalOrder::ByDepth,
        }
    }
}

/// Parse a stage name
pub fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse::<Stage>().map_err(|e| e.to_string())
}
