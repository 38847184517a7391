// ABOUTME: Deploy lock to prevent concurrent releases of the same service on this host.
// ABOUTME: Atomic create of <state_dir>/<service>.lock holding JSON info about the holder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::types::ServiceName;

use super::DeployError;

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub service: String,
}

impl LockInfo {
    pub fn new(service: &ServiceName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            service: service.to_string(),
        }
    }

    /// Older than one hour.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    pub fn lock_path(state_dir: &Path, service: &ServiceName) -> PathBuf {
        state_dir.join(format!("{}.lock", service))
    }
}

/// A held deploy lock. Released explicitly with [`DeployLock::release`] or on drop.
#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
    released: bool,
}

impl DeployLock {
    /// Take the lock for `service`.
    ///
    /// A stale lock (>1 hour) or an unreadable one is broken with a warning;
    /// `force` breaks a live one too.
    pub fn acquire(
        state_dir: &Path,
        service: &ServiceName,
        force: bool,
    ) -> Result<Self, DeployError> {
        std::fs::create_dir_all(state_dir).map_err(|e| {
            DeployError::Lock(format!(
                "failed to create state directory {}: {}",
                state_dir.display(),
                e
            ))
        })?;

        let path = LockInfo::lock_path(state_dir, service);
        let info = LockInfo::new(service);

        if Self::try_create(&path, &info)? {
            return Ok(Self::held(path));
        }

        if !Self::should_break(&path, force)? {
            return match Self::read(&path) {
                Some(existing) => Err(DeployError::LockHeld {
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                }),
                None => Err(DeployError::Lock(
                    "lock held by another process".to_string(),
                )),
            };
        }

        tracing::debug!(path = %path.display(), "removing stale or forced lock");
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(DeployError::Lock(format!("failed to break lock: {}", e))),
        }

        if Self::try_create(&path, &info)? {
            Ok(Self::held(path))
        } else {
            Err(DeployError::Lock(
                "lock acquired by another process during break".to_string(),
            ))
        }
    }

    fn held(path: PathBuf) -> Self {
        tracing::debug!(path = %path.display(), "deploy lock acquired");
        Self {
            path,
            released: false,
        }
    }

    /// `Ok(false)` when the file already exists.
    fn try_create(path: &Path, info: &LockInfo) -> Result<bool, DeployError> {
        let json = serde_json::to_string(info)
            .map_err(|e| DeployError::Lock(format!("failed to serialize lock: {}", e)))?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(DeployError::Lock(format!("failed to create lock: {}", e))),
        };
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| DeployError::Lock(format!("failed to write lock: {}", e)))?;
        Ok(true)
    }

    fn read(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn should_break(path: &Path, force: bool) -> Result<bool, DeployError> {
        match Self::read(path) {
            Some(existing) if force => {
                tracing::warn!(
                    "Breaking lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                Ok(true)
            }
            Some(existing) if existing.is_stale() => {
                tracing::warn!(
                    "Auto-breaking stale lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                tracing::warn!("Lock info unreadable, breaking lock");
                Ok(true)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file.
    pub fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeployError::Lock(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
