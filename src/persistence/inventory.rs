//! Ansible style inventory files built from the provisioned assets

use crate::core::resource::Resource;
use crate::core::{Asset, TefloConfig};
use crate::error::Result;
use crate::graph::ScenarioGraph;
use crate::persistence::lock::FileLock;
use serde_yaml::Value;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// File name of a scenario's inventory
pub fn inventory_file_name(scenario: &str) -> String {
    format!("inventory-{}", scenario.replace(char::is_whitespace, "_"))
}

fn host_var(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.contains(char::is_whitespace) => Some(format!("\"{}\"", s)),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn host_line(asset: &Asset, address: &str) -> String {
    let mut line = format!("{} ansible_host={}", asset.name(), address);
    if let Some(vars) = asset.params.get("ansible_params").and_then(Value::as_mapping) {
        for (key, value) in vars {
            if let (Some(key), Some(value)) = (key.as_str(), host_var(value)) {
                let _ = write!(line, " {}={}", key, value);
            }
        }
    }
    line
}

/// Render the inventory for the assets that expose an address
///
/// Every reachable host is listed under `[all]`; each group gets its own
/// section in order of first appearance.
pub fn render(assets: &[&Asset]) -> String {
    let hosts: Vec<(&Asset, String)> = assets
        .iter()
        .filter_map(|asset| asset.address().map(|addr| (*asset, addr)))
        .collect();

    let mut out = String::from("[all]\n");
    for (asset, address) in &hosts {
        out.push_str(&host_line(asset, address));
        out.push('\n');
    }

    let mut groups: Vec<&str> = Vec::new();
    for (asset, _) in &hosts {
        for group in &asset.groups {
            if !groups.contains(&group.as_str()) {
                groups.push(group);
            }
        }
    }
    for group in groups {
        let _ = write!(out, "\n[{}]\n", group);
        for (asset, _) in hosts.iter().filter(|(a, _)| a.groups.iter().any(|g| g == group)) {
            out.push_str(asset.name());
            out.push('\n');
        }
    }
    out
}

/// Writes the run's inventory under the inventory lock
#[derive(Debug, Clone)]
pub struct InventoryWriter {
    folder: PathBuf,
    lock_timeout: Duration,
}

impl InventoryWriter {
    pub fn new(config: &TefloConfig) -> Self {
        Self {
            folder: config.inventory_folder(),
            lock_timeout: Duration::from_secs(config.inventory_lock_timeout_secs),
        }
    }

    pub fn path_for(&self, scenario: &str) -> PathBuf {
        self.folder.join(inventory_file_name(scenario))
    }

    /// Rebuild the inventory from every asset in the graph
    ///
    /// Returns `None` when no asset has an address.
    pub async fn write(&self, graph: &ScenarioGraph) -> Result<Option<PathBuf>> {
        let assets = graph.get_assets();
        if assets.iter().all(|a| a.address().is_none()) {
            debug!("No addressable assets, skipping inventory");
            return Ok(None);
        }

        std::fs::create_dir_all(&self.folder)?;
        let _guard = FileLock::new(self.folder.join(".inventory.lock"))
            .acquire(self.lock_timeout)
            .await?;

        let path = self.path_for(&graph.root().name);
        std::fs::write(&path, render(&assets))?;
        info!("Wrote inventory {}", path.display());
        Ok(Some(path))
    }
}
