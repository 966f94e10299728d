//! Plugins shipped with teflo
//!
//! `shell` runs local commands for orchestrate and execute, `log` reports
//! notifications through tracing.

use crate::core::resource::Resource;
use crate::core::{Action, Asset, Execute, Notification};
use crate::plugins::{Executor, NotificationContext, Notifier, Orchestrator, PluginError};
use async_trait::async_trait;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tokio::process::Command;
use tracing::{info, warn};

/// Commands listed under `shell:`, given as strings or `{command: ...}`
fn shell_commands(params: &Mapping) -> Vec<String> {
    match params.get("shell") {
        Some(Value::String(cmd)) => vec![cmd.clone()],
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(cmd) => Some(cmd.clone()),
                Value::Mapping(m) => m.get("command").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn environment(params: &Mapping) -> Vec<(String, String)> {
    params
        .get("environment")
        .and_then(Value::as_mapping)
        .map(|env| {
            env.iter()
                .filter_map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        _ => return None,
                    };
                    k.as_str().map(|k| (k.to_string(), value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Run commands in order; stops at the first non-zero exit code
async fn run_commands(resource: &str, params: &Mapping, hosts: &[Asset]) -> Result<i32, PluginError> {
    let addresses: Vec<String> = hosts.iter().filter_map(Asset::address).collect();
    let names: Vec<&str> = hosts.iter().map(|h| h.name()).collect();

    for cmd in shell_commands(params) {
        info!("[{}] $ {}", resource, cmd);
        let output = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .envs(environment(params))
            .env("TEFLO_HOSTS", names.join(","))
            .env("TEFLO_HOST_ADDRESSES", addresses.join(","))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PluginError::Spawn(format!("sh: {}", e)))?;

        let rc = output.status.code().unwrap_or(-1);
        if rc != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("[{}] command exited with {}: {}", resource, rc, stderr.trim());
            return Ok(rc);
        }
    }
    Ok(0)
}

fn require_commands(params: &Mapping) -> Result<(), PluginError> {
    if shell_commands(params).is_empty() {
        return Err(PluginError::Invalid("no 'shell' commands given".to_string()));
    }
    Ok(())
}

/// Runs an action's `shell` commands on the local machine
#[derive(Debug, Default)]
pub struct ShellOrchestrator;

#[async_trait]
impl Orchestrator for ShellOrchestrator {
    fn name(&self) -> &str {
        "shell"
    }

    async fn validate(&self, action: &Action) -> Result<(), PluginError> {
        require_commands(&action.params)
    }

    async fn run(&self, action: &Action, hosts: &[Asset]) -> Result<i32, PluginError> {
        run_commands(action.name(), &action.params, hosts).await
    }
}

/// Runs an execute's `shell` commands and collects local artifacts
#[derive(Debug, Default)]
pub struct ShellExecutor;

#[async_trait]
impl Executor for ShellExecutor {
    fn name(&self) -> &str {
        "shell"
    }

    async fn validate(&self, execute: &Execute) -> Result<(), PluginError> {
        require_commands(&execute.params)
    }

    async fn run(&self, execute: &mut Execute, hosts: &[Asset]) -> Result<i32, PluginError> {
        let rc = run_commands(execute.name(), &execute.params, hosts).await?;
        execute.artifact_locations = execute
            .artifacts
            .iter()
            .filter(|artifact| Path::new(artifact.as_str()).exists())
            .cloned()
            .collect();
        Ok(rc)
    }
}

/// Writes notifications to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn validate(&self, _notification: &Notification) -> Result<(), PluginError> {
        Ok(())
    }

    async fn notify(&self, notification: &Notification, context: &NotificationContext) -> Result<(), PluginError> {
        let subject = notification
            .params
            .get("subject")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Teflo scenario {}", context.scenario));
        let trigger = context.trigger.map(|t| t.as_str()).unwrap_or("on_demand");
        info!(
            "[{}] {} ({}): passed={:?} failed={:?} status={}",
            notification.name(),
            subject,
            trigger,
            context.passed_tasks,
            context.failed_tasks,
            context.overall_status
        );
        Ok(())
    }
}
