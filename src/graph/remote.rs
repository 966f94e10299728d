//! Remote workspaces: git repositories searched for includes

use crate::core::RemoteWorkspace;
use crate::error::{IncludeErrorKind, Result, TefloError};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Local checkout of a remote workspace under `base`
pub fn checkout_dir(base: &Path, workspace: &RemoteWorkspace) -> PathBuf {
    base.join(&workspace.alias)
}

/// Clone `workspace` unless it is already checked out
///
/// `parent` names the descriptor declaring the workspace, for error reports.
pub fn ensure_checkout(base: &Path, workspace: &RemoteWorkspace, parent: &str) -> Result<PathBuf> {
    let dir = checkout_dir(base, workspace);
    if dir.is_dir() {
        debug!("Remote workspace '{}' already at {}", workspace.alias, dir.display());
        return Ok(dir);
    }

    let git = which::which("git").map_err(|e| {
        TefloError::include(
            IncludeErrorKind::Missing,
            parent,
            format!("cannot clone {}: git not found ({})", workspace.workspace_url, e),
        )
    })?;

    std::fs::create_dir_all(base)?;
    info!("Cloning remote workspace {} into {}", workspace.workspace_url, dir.display());
    let output = Command::new(git)
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg(&workspace.workspace_url)
        .arg(&dir)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TefloError::include(
            IncludeErrorKind::Missing,
            parent,
            format!("cloning {} failed: {}", workspace.workspace_url, stderr.trim()),
        ));
    }
    Ok(dir)
}
