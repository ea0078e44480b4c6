//! The self-upgrade flow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::homebrew;
use crate::release::ReleaseSource;
use crate::replace::{FileOps, StdFileOps, UpgradeOperation};
use crate::stage::{current_executable, resolve_executable, stage_release};
use crate::version::{InstallChannel, VersionCheck};

/// What an upgrade did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The executable at `path` was replaced.
    Replaced {
        path: PathBuf,
        version: String,
        /// Backup that could not be removed afterwards.
        leftover_backup: Option<PathBuf>,
    },
    /// Homebrew performed the upgrade.
    Homebrew { formula: String },
}

/// Replaces the running deployctl with a newer release.
pub struct SelfUpgrader {
    current_version: String,
    release: ReleaseSource,
    homebrew_formula: String,
    file_ops: Arc<dyn FileOps>,
}

impl SelfUpgrader {
    pub fn new(
        current_version: impl Into<String>,
        release: ReleaseSource,
        homebrew_formula: impl Into<String>,
    ) -> Self {
        Self {
            current_version: current_version.into(),
            release,
            homebrew_formula: homebrew_formula.into(),
            file_ops: Arc::new(StdFileOps),
        }
    }

    /// Use `ops` for the swap instead of the real filesystem calls.
    pub fn with_file_ops(mut self, ops: Arc<dyn FileOps>) -> Self {
        self.file_ops = ops;
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn channel(&self) -> InstallChannel {
        InstallChannel::of(&self.current_version)
    }

    /// Latest release as this install's channel names it.
    pub async fn latest_version(&self) -> Result<String> {
        let tag = self.release.latest_version().await?;
        Ok(self.channel().version_for(&tag))
    }

    /// Compare the running version with the latest release. Development
    /// builds are reported without a network call.
    pub async fn check(&self) -> Result<VersionCheck> {
        if crate::version::is_development(&self.current_version) {
            return Ok(VersionCheck::Development);
        }
        let latest = self.latest_version().await?;
        let check = VersionCheck::compare(&self.current_version, &latest);
        debug!(current = %self.current_version, latest = %latest, ?check, "version check");
        Ok(check)
    }

    /// Upgrade to `target_version` through this install's channel.
    pub async fn upgrade(&self, target_version: &str) -> Result<UpgradeOutcome> {
        match self.channel() {
            InstallChannel::Homebrew => {
                homebrew::upgrade(&self.homebrew_formula).await?;
                Ok(UpgradeOutcome::Homebrew {
                    formula: self.homebrew_formula.clone(),
                })
            }
            InstallChannel::Direct => {
                let executable = current_executable()?;
                self.replace_binary(&executable, target_version).await
            }
        }
    }

    /// Download `target_version` and swap it in for the binary at `path`.
    ///
    /// If the download fails the file at `path` is never touched.
    pub async fn upgrade_binary_at(&self, path: &Path, target_version: &str) -> Result<UpgradeOutcome> {
        let executable = resolve_executable(path)?;
        self.replace_binary(&executable, target_version).await
    }

    async fn replace_binary(&self, executable: &Path, target_version: &str) -> Result<UpgradeOutcome> {
        info!(
            path = %executable.display(),
            from = %self.current_version,
            to = %target_version,
            "upgrading binary"
        );

        let staged = stage_release(&self.release, target_version, executable).await?;
        debug!(staged = %staged.path().display(), bytes = staged.size(), "release staged");

        let operation = UpgradeOperation::new(executable, staged.path(), target_version);
        // On error `staged` is dropped and the staging file removed.
        let committed = operation.commit(self.file_ops.as_ref())?;
        staged.keep();

        Ok(UpgradeOutcome::Replaced {
            path: operation.current_binary_path,
            version: operation.target_version,
            leftover_backup: committed.leftover_backup,
        })
    }
}
