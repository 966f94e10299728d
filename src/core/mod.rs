//! Core domain models for Teflo
//!
//! This module defines the scenario, its five resource types, the stage and
//! task vocabulary, and the run configuration.

pub mod action;
pub mod asset;
pub mod clock;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod execute;
pub mod notification;
pub mod report;
pub mod resource;
pub mod scenario;
pub mod state;
pub mod task;

pub use action::Action;
pub use asset::Asset;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{RunOptions, TefloConfig, TraversalOrder};
pub use context::VariableContext;
pub use descriptor::Descriptor;
pub use execute::Execute;
pub use notification::Notification;
pub use report::Report;
pub use resource::{AnyResource, PluginRef, Resource, ResourceId, ResourceKind};
pub use scenario::{RemoteWorkspace, ResourceCheck, Scenario};
pub use state::*;
pub use task::{Stage, TaskClass, TaskSpec, Trigger};
