//! External plugins driven as subprocesses
//!
//! An executable named `teflo-plugin-<name>` is invoked as
//! `teflo-plugin-<name> <capability> <method>` with a JSON request on stdin
//! and is expected to print a JSON reply on stdout.

use crate::core::resource::Resource;
use crate::core::{Action, Asset, Execute, Notification, Report, TefloConfig};
use crate::plugins::{Executor, Importer, NotificationContext, Notifier, Orchestrator, PluginError, Provisioner};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Executable name prefix of subprocess plugins
pub const PLUGIN_PREFIX: &str = "teflo-plugin-";

/// A plugin living in its own executable
#[derive(Debug, Clone)]
pub struct SubprocessPlugin {
    name: String,
    path: PathBuf,
}

impl SubprocessPlugin {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Look for `teflo-plugin-<name>` on the configured plugin path, then `PATH`
    pub fn discover(name: &str, config: &TefloConfig) -> Option<Self> {
        let exe = format!("{}{}", PLUGIN_PREFIX, name);
        let found = config
            .plugin_path
            .iter()
            .map(|dir| dir.join(&exe))
            .find(|candidate| candidate.is_file())
            .or_else(|| which::which(&exe).ok())?;
        debug!("Found plugin '{}' at {}", name, found.display());
        Some(Self::new(name, found))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run one plugin call and decode its reply
    ///
    /// The caller bounds the call with its task timeout; dropping the future
    /// kills the child.
    pub async fn call(&self, capability: &str, method: &str, request: JsonValue) -> Result<JsonValue, PluginError> {
        debug!("Calling plugin {} {} {}", self.name, capability, method);

        let mut child = Command::new(&self.path)
            .args([capability, method])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PluginError::Spawn(format!("{}: {}", self.path.display(), e)))?;

        let payload = serde_json::to_vec(&request).map_err(|e| PluginError::Protocol(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| PluginError::Protocol(format!("failed to send request: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PluginError::Spawn(format!("{}: {}", self.path.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!("plugin {} exited with code {}: {}", self.name, exit_code, stderr.trim());
            return Err(PluginError::Failed(format!(
                "{} {} exited with code {}: {}",
                capability,
                method,
                exit_code,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| PluginError::Protocol(format!("reply is not UTF-8: {}", e)))?;
        if stdout.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&stdout).map_err(|e| PluginError::Protocol(format!("invalid reply: {}", e)))
    }
}

fn to_json(profile: &Mapping) -> Result<JsonValue, PluginError> {
    serde_json::to_value(profile).map_err(|e| PluginError::Protocol(e.to_string()))
}

fn hosts_json(hosts: &[Asset]) -> Result<JsonValue, PluginError> {
    hosts.iter().map(|h| to_json(&h.profile())).collect::<Result<Vec<_>, _>>().map(JsonValue::Array)
}

fn reply_rc(reply: &JsonValue) -> Result<i32, PluginError> {
    let rc = reply
        .get("rc")
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| PluginError::Protocol("reply has no 'rc'".to_string()))?;
    i32::try_from(rc).map_err(|_| PluginError::Protocol(format!("reply 'rc' {} is out of range", rc)))
}

fn reply_mappings(reply: &JsonValue, key: &str) -> Result<Vec<Mapping>, PluginError> {
    match reply.get(key) {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| PluginError::Protocol(format!("'{}' must be a list of objects: {}", key, e))),
    }
}

#[async_trait]
impl Provisioner for SubprocessPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, asset: &Asset) -> Result<(), PluginError> {
        self.call("provisioner", "validate", json!({ "asset": to_json(&asset.profile())? }))
            .await
            .map(|_| ())
    }

    async fn authenticate(&self, asset: &Asset) -> Result<(), PluginError> {
        self.call("provisioner", "authenticate", json!({ "asset": to_json(&asset.profile())? }))
            .await
            .map(|_| ())
    }

    async fn create(&self, asset: &Asset) -> Result<Vec<Mapping>, PluginError> {
        let reply = self
            .call("provisioner", "create", json!({ "asset": to_json(&asset.profile())? }))
            .await?;
        reply_mappings(&reply, "hosts")
    }

    async fn delete(&self, asset: &Asset) -> Result<(), PluginError> {
        self.call("provisioner", "delete", json!({ "asset": to_json(&asset.profile())? }))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Orchestrator for SubprocessPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, action: &Action) -> Result<(), PluginError> {
        self.call("orchestrator", "validate", json!({ "action": to_json(&action.profile())? }))
            .await
            .map(|_| ())
    }

    async fn run(&self, action: &Action, hosts: &[Asset]) -> Result<i32, PluginError> {
        let request = json!({ "action": to_json(&action.profile())?, "hosts": hosts_json(hosts)? });
        let reply = self.call("orchestrator", "run", request).await?;
        reply_rc(&reply)
    }
}

#[async_trait]
impl Executor for SubprocessPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, execute: &Execute) -> Result<(), PluginError> {
        self.call("executor", "validate", json!({ "execute": to_json(&execute.profile())? }))
            .await
            .map(|_| ())
    }

    async fn run(&self, execute: &mut Execute, hosts: &[Asset]) -> Result<i32, PluginError> {
        let request = json!({ "execute": to_json(&execute.profile())?, "hosts": hosts_json(hosts)? });
        let reply = self.call("executor", "run", request).await?;

        if let Some(locations) = reply.get("artifact_locations").and_then(JsonValue::as_array) {
            execute.artifact_locations = locations
                .iter()
                .filter_map(|l| l.as_str().map(str::to_string))
                .collect();
        }
        if let Some(results) = reply.get("testrun_results").filter(|v| v.is_object()) {
            execute.testrun_results = serde_json::from_value(results.clone())
                .map_err(|e| PluginError::Protocol(format!("invalid testrun_results: {}", e)))?;
        }
        reply_rc(&reply)
    }
}

#[async_trait]
impl Importer for SubprocessPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, report: &Report) -> Result<(), PluginError> {
        self.call("importer", "validate", json!({ "report": to_json(&report.profile())? }))
            .await
            .map(|_| ())
    }

    async fn validate_artifacts(&self, report: &Report, executes: &[Execute]) -> Result<(), PluginError> {
        let executes = executes
            .iter()
            .map(|e| to_json(&e.profile()))
            .collect::<Result<Vec<_>, _>>()?;
        let request = json!({ "report": to_json(&report.profile())?, "executes": executes });
        self.call("importer", "validate_artifacts", request).await.map(|_| ())
    }

    async fn import_artifacts(&self, report: &mut Report, executes: &[Execute]) -> Result<(), PluginError> {
        let executes = executes
            .iter()
            .map(|e| to_json(&e.profile()))
            .collect::<Result<Vec<_>, _>>()?;
        let request = json!({ "report": to_json(&report.profile())?, "executes": executes });
        let reply = self.call("importer", "import_artifacts", request).await?;
        report.import_results = reply_mappings(&reply, "import_results")?;
        Ok(())
    }

    async fn cleanup_artifacts(&self, report: &Report) -> Result<(), PluginError> {
        self.call("importer", "cleanup_artifacts", json!({ "report": to_json(&report.profile())? }))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Notifier for SubprocessPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, notification: &Notification) -> Result<(), PluginError> {
        self.call("notifier", "validate", json!({ "notification": to_json(&notification.profile())? }))
            .await
            .map(|_| ())
    }

    async fn notify(&self, notification: &Notification, context: &NotificationContext) -> Result<(), PluginError> {
        let context = serde_json::to_value(context).map_err(|e| PluginError::Protocol(e.to_string()))?;
        let request = json!({ "notification": to_json(&notification.profile())?, "context": context });
        self.call("notifier", "notify", request).await.map(|_| ())
    }
}
