//! Two-phase replacement of the executable with rollback.
//!
//! ```text
//! current ──rename──▶ current.bak          (phase 1: backup)
//! staged  ──rename──▶ current              (phase 2: install)
//!           failure ──▶ current.bak ──rename──▶ current   (rollback)
//! current.bak ──remove                     (cleanup)
//! ```
//!
//! `commit` either leaves the new binary in place or the original restored.
//! The only exception is a failed rollback, reported as `RollbackFailed`.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, UpgradeError};

/// Suffix of the backup taken during the swap.
pub const BACKUP_SUFFIX: &str = ".bak";

/// The filesystem calls a swap needs.
pub trait FileOps: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`FileOps`] on the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// `<path>.bak`.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// How a committed swap finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Backup that could not be removed, if any.
    pub leftover_backup: Option<PathBuf>,
}

/// One in-flight replacement of the running executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOperation {
    pub current_binary_path: PathBuf,
    pub backup_path: PathBuf,
    pub staged_new_binary_path: PathBuf,
    pub target_version: String,
}

impl UpgradeOperation {
    pub fn new(
        current_binary_path: impl Into<PathBuf>,
        staged_new_binary_path: impl Into<PathBuf>,
        target_version: impl Into<String>,
    ) -> Self {
        let current_binary_path = current_binary_path.into();
        Self {
            backup_path: backup_path_for(&current_binary_path),
            current_binary_path,
            staged_new_binary_path: staged_new_binary_path.into(),
            target_version: target_version.into(),
        }
    }

    /// Swap the staged binary in, rolling back if the install step fails.
    pub fn commit(&self, ops: &dyn FileOps) -> Result<Committed> {
        let current = &self.current_binary_path;
        let backup = &self.backup_path;

        ops.rename(current, backup)
            .map_err(|source| UpgradeError::BackupFailed {
                path: current.clone(),
                source,
            })?;

        if let Err(replace_error) = ops.rename(&self.staged_new_binary_path, current) {
            warn!(
                path = %current.display(),
                error = %replace_error,
                "install failed, restoring previous binary"
            );
            return match ops.rename(backup, current) {
                Ok(()) => Err(UpgradeError::ReplaceFailed {
                    path: current.clone(),
                    source: replace_error,
                }),
                Err(rollback_error) => Err(UpgradeError::RollbackFailed {
                    path: current.clone(),
                    backup: backup.clone(),
                    replace_error,
                    rollback_error,
                }),
            };
        }

        info!(path = %current.display(), version = %self.target_version, "new binary installed");

        let leftover_backup = match ops.remove_file(backup) {
            Ok(()) => None,
            Err(e) => {
                warn!(backup = %backup.display(), error = %e, "could not remove backup");
                Some(backup.clone())
            }
        };
        Ok(Committed { leftover_backup })
    }
}
