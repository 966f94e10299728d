//! Plugin contracts consumed by task execution
//!
//! Provisioners, orchestrators, executors, importers and notifiers are
//! external collaborators. Resources bind to them by name; the
//! [`PluginRegistry`] turns names into implementations.

pub mod builtin;
pub mod registry;
pub mod subprocess;

pub use registry::PluginRegistry;

use crate::core::task::Trigger;
use crate::core::{Action, Asset, Execute, Notification, Report};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use thiserror::Error;

/// Error types for plugin calls
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("validation failed: {0}")]
    Invalid(String),

    #[error("plugin protocol error: {0}")]
    Protocol(String),

    #[error("failed to spawn plugin: {0}")]
    Spawn(String),
}

/// Creates and deletes hosts
#[async_trait]
pub trait Provisioner: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, asset: &Asset) -> Result<(), PluginError>;

    async fn authenticate(&self, _asset: &Asset) -> Result<(), PluginError> {
        Ok(())
    }

    /// Provision the asset; one mapping per machine created
    async fn create(&self, asset: &Asset) -> Result<Vec<Mapping>, PluginError>;

    async fn delete(&self, asset: &Asset) -> Result<(), PluginError>;
}

/// Configures hosts
#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, action: &Action) -> Result<(), PluginError>;

    /// Run the action against its hosts, returning the exit code
    async fn run(&self, action: &Action, hosts: &[Asset]) -> Result<i32, PluginError>;
}

/// Runs tests
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, execute: &Execute) -> Result<(), PluginError>;

    /// Run the tests, recording artifact locations and results on `execute`
    async fn run(&self, execute: &mut Execute, hosts: &[Asset]) -> Result<i32, PluginError>;
}

/// Imports test artifacts into an external system
#[async_trait]
pub trait Importer: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, report: &Report) -> Result<(), PluginError>;

    async fn validate_artifacts(&self, report: &Report, executes: &[Execute]) -> Result<(), PluginError>;

    async fn import_artifacts(&self, report: &mut Report, executes: &[Execute]) -> Result<(), PluginError>;

    async fn cleanup_artifacts(&self, _report: &Report) -> Result<(), PluginError> {
        Ok(())
    }
}

/// What a notifier is told about the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContext {
    pub scenario: String,
    pub trigger: Option<Trigger>,
    pub passed_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
    pub overall_status: i32,
}

/// Sends messages about the run
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, notification: &Notification) -> Result<(), PluginError>;

    async fn notify(&self, notification: &Notification, context: &NotificationContext) -> Result<(), PluginError>;
}
