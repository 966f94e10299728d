//! Building the scenario graph from a root descriptor

use crate::core::{Descriptor, Scenario, TefloConfig, VariableContext};
use crate::error::{IncludeErrorKind, Result, TefloError};
use crate::graph::{remote, ScenarioGraph};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Recursively attaches included descriptors to their parents
///
/// Every descriptor is rendered through the shared variable context before it
/// is parsed. A file can be attached once; including it again is a cycle.
pub struct GraphBuilder {
    config: Arc<TefloConfig>,
    vars: VariableContext,
    workspace: PathBuf,
    attached: HashSet<PathBuf>,
    remote_dirs: Vec<PathBuf>,
}

impl GraphBuilder {
    pub fn new(config: Arc<TefloConfig>, vars: VariableContext) -> Self {
        let workspace = config
            .workspace
            .canonicalize()
            .unwrap_or_else(|_| config.workspace.clone());
        Self {
            config,
            vars,
            workspace,
            attached: HashSet::new(),
            remote_dirs: Vec::new(),
        }
    }

    /// Build the graph rooted at `root`
    pub fn build(mut self, root: &Path) -> Result<ScenarioGraph> {
        let candidate = if root.is_absolute() || root.exists() {
            root.to_path_buf()
        } else {
            self.workspace.join(root)
        };
        let path = candidate.canonicalize().map_err(|_| {
            TefloError::include(
                IncludeErrorKind::Missing,
                root.display().to_string(),
                "scenario descriptor not found",
            )
        })?;

        self.attached.insert(path.clone());
        let relative = self.relative_name(&path);
        let scenario = self.load_node(&path, relative)?;
        info!(
            "Loaded scenario '{}' with {} included scenario(s)",
            scenario.name,
            self.attached.len() - 1
        );
        Ok(ScenarioGraph::new(scenario))
    }

    fn relative_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.workspace)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn load_node(&mut self, path: &Path, relative: String) -> Result<Scenario> {
        debug!("Loading descriptor {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let rendered = self.vars.render(&text);
        let descriptor = Descriptor::parse(&rendered, path, relative.clone())?;

        let remote_base = self.config.remote_workspace_dir();
        for workspace in descriptor.remote_workspaces()? {
            let dir = remote::ensure_checkout(&remote_base, &workspace, &relative)?;
            if !self.remote_dirs.contains(&dir) {
                self.remote_dirs.push(dir);
            }
        }

        let includes = descriptor.includes();
        let mut scenario = descriptor.into_scenario(Arc::clone(&self.config))?;

        for include in includes {
            let child_path = self.resolve_include(&include, &relative)?;
            if !self.attached.insert(child_path.clone()) {
                return Err(TefloError::include(
                    IncludeErrorKind::Cycle,
                    relative,
                    format!("{} is already attached", include.trim()),
                ));
            }
            let child_relative = self.relative_name(&child_path);
            let child = self.load_node(&child_path, child_relative)?;
            scenario.child_scenarios.push(child);
        }

        Ok(scenario)
    }

    /// Locate an include: workspace-relative, as given, then remote workspaces
    fn resolve_include(&self, include: &str, parent: &str) -> Result<PathBuf> {
        let include = include.trim();
        if include.is_empty() {
            return Err(TefloError::include(IncludeErrorKind::Empty, parent, "include entry is empty"));
        }

        let candidates = std::iter::once(self.workspace.join(include))
            .chain(std::iter::once(PathBuf::from(include)))
            .chain(self.remote_dirs.iter().map(|dir| dir.join(include)));

        for candidate in candidates {
            if candidate.is_file() {
                return Ok(candidate.canonicalize()?);
            }
        }

        Err(TefloError::include(
            IncludeErrorKind::Missing,
            parent,
            format!("{} could not be found", include),
        ))
    }
}
