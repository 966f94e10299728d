//! teflo - test scenario orchestration
//!
//! A scenario descriptor declares assets to provision, actions to configure
//! them, tests to execute, reports to import and notifications to send.
//! teflo builds the graph of included descriptors and drives it through the
//! fixed stages `validate → provision → orchestrate → execute → report → cleanup`.

pub mod cli;
pub mod core;
pub mod error;
pub mod execution;
pub mod graph;
pub mod persistence;
pub mod plugins;

// Re-export commonly used types
pub use crate::core::{RunOptions, RunReport, Scenario, Stage, TefloConfig, TraversalOrder, Trigger, VariableContext};
pub use error::{Result, TefloError};
pub use execution::{Teflo, TefloEvent};
pub use graph::ScenarioGraph;
pub use plugins::PluginRegistry;
