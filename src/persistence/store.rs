//! YAML results files on disk

use crate::core::TefloConfig;
use crate::error::Result;
use crate::persistence::{ResultsBackend, ResultsDocument};
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Results written under the configured results folder
#[derive(Debug, Clone)]
pub struct ResultsStore {
    folder: PathBuf,
}

impl ResultsStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self { folder: folder.into() }
    }

    pub fn from_config(config: &TefloConfig) -> Self {
        Self::new(config.results_folder())
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

fn copy_dir_all(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl ResultsBackend for ResultsStore {
    async fn save(&self, documents: &[ResultsDocument]) -> Result<()> {
        std::fs::create_dir_all(&self.folder)?;
        for doc in documents {
            let path = self.folder.join(&doc.file_name);
            std::fs::write(&path, serde_yaml::to_string(&doc.document)?)?;
            debug!("Wrote {}", path.display());
        }
        info!("Results written to {}", self.folder.display());
        Ok(())
    }

    async fn load(&self, file_name: &str) -> Result<Option<Mapping>> {
        let path = self.folder.join(file_name);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Some(serde_yaml::from_str(&text)?))
    }

    async fn archive(&self, config: &TefloConfig) -> Result<()> {
        std::fs::create_dir_all(&self.folder)?;

        let inventory = config.inventory_folder();
        if inventory.is_dir() && !inventory.starts_with(&self.folder) {
            copy_dir_all(&inventory, &self.folder.join("inventory"))?;
        }

        let artifacts = config.run_dir().join("artifacts");
        if artifacts.is_dir() {
            copy_dir_all(&artifacts, &self.folder.join("artifacts"))?;
        }

        let log = config.log_file();
        if log.is_file() {
            if let Some(name) = log.file_name() {
                std::fs::copy(&log, self.folder.join(name))?;
            }
        } else {
            warn!("No log file at {}", log.display());
        }
        info!("Archived run {} into {}", config.run_id, self.folder.display());
        Ok(())
    }
}
