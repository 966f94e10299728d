//! File based mutual exclusion for shared run files
//!
//! The lock file is created with `create_new`, so only one holder can win.
//! A lock whose recorded expiry has passed is considered abandoned and taken
//! over. Dropping the guard removes the file.

use crate::error::{Result, TefloError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a lock is honoured before it counts as stale
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(120);

const BACKOFF_BASE: Duration = Duration::from_millis(20);
const BACKOFF_MAX: Duration = Duration::from_secs(2);

/// Contents of a lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    fn new(holder_id: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            holder_id: holder_id.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(120)),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// A lock on one path
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    holder_id: String,
    ttl: Duration,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            holder_id: uuid::Uuid::new_v4().to_string(),
            ttl: DEFAULT_LOCK_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the lock, backing off exponentially, for at most `wait`
    pub async fn acquire(&self, wait: Duration) -> Result<LockGuard> {
        let started = Instant::now();
        let mut backoff = BACKOFF_BASE;

        loop {
            if self.try_acquire()? {
                debug!("Acquired lock {}", self.path.display());
                return Ok(LockGuard {
                    path: self.path.clone(),
                    holder_id: self.holder_id.clone(),
                });
            }

            if self.take_over_stale()? {
                continue;
            }

            if started.elapsed() >= wait {
                return Err(TefloError::Lock {
                    path: self.path.display().to_string(),
                    message: format!("still held after {}s", wait.as_secs_f32()),
                });
            }
            tokio::time::sleep(backoff.min(BACKOFF_MAX)).await;
            backoff = backoff.saturating_mul(2);
        }
    }

    fn try_acquire(&self) -> Result<bool> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let info = LockInfo::new(&self.holder_id, self.ttl);
        let body = serde_json::to_vec(&info).map_err(|e| TefloError::Lock {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        file.write_all(&body)?;
        Ok(true)
    }

    /// Remove the lock file when its holder let it expire
    fn take_over_stale(&self) -> Result<bool> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        // A half-written lock file belongs to a holder still writing it
        let Ok(info) = serde_json::from_str::<LockInfo>(&text) else {
            return Ok(false);
        };
        if !info.is_expired() {
            return Ok(false);
        }
        warn!("Taking over stale lock {} held by {}", self.path.display(), info.holder_id);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

/// Held lock; released on drop
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    holder_id: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let ours = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str::<LockInfo>(&text).ok())
            .is_some_and(|info| info.holder_id == self.holder_id);
        if ours {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to release lock {}: {}", self.path.display(), e);
            }
        }
    }
}
