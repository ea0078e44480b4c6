//! Staging area for a downloaded binary.

use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempPath};
use tracing::{debug, warn};

use crate::error::{Result, UpgradeError};
use crate::release::ReleaseSource;

const STAGING_PREFIX: &str = ".deployctl-upgrade-";

/// A downloaded, executable binary waiting to be installed.
///
/// The file is deleted on drop unless [`keep`](Self::keep) is called after
/// it was moved into place.
#[derive(Debug)]
pub struct StagedBinary {
    path: TempPath,
    size: u64,
}

impl StagedBinary {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Stop tracking the file once it has been renamed away.
    pub fn keep(self) {
        if let Err(e) = self.path.keep() {
            warn!(error = %e, "could not release staged file");
        }
    }
}

/// Create the staging file next to `executable`, so the install rename
/// stays on one filesystem, or in the temp dir if that is not writable.
fn create_staging_file(executable: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(STAGING_PREFIX);

    if let Some(dir) = executable.parent() {
        match builder.tempfile_in(dir) {
            Ok(file) => return Ok(file),
            Err(e) => debug!(
                dir = %dir.display(),
                error = %e,
                "cannot stage next to executable, using temp dir"
            ),
        }
    }
    builder.tempfile()
}

/// Download `version` into a fresh staging file and make it executable.
pub async fn stage_release(
    source: &ReleaseSource,
    version: &str,
    executable: &Path,
) -> Result<StagedBinary> {
    let storage_error = |reason: String| UpgradeError::DownloadFailed {
        version: version.to_string(),
        reason,
    };

    let (file, path) = create_staging_file(executable)
        .map_err(|e| storage_error(format!("could not create staging file: {}", e)))?
        .into_parts();
    debug!(path = %path.display(), "staging download");

    let mut file = tokio::fs::File::from_std(file);
    let size = source.download(version, &mut file).await?;
    file.sync_all()
        .await
        .map_err(|e| storage_error(format!("could not write staged binary: {}", e)))?;
    drop(file);

    make_executable(&path)
        .await
        .map_err(|e| storage_error(format!("could not mark staged binary executable: {}", e)))?;

    Ok(StagedBinary { path, size })
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Where the running executable really lives, symlinks resolved.
pub fn current_executable() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(UpgradeError::ResolveExecutable)?;
    resolve_executable(&exe)
}

pub fn resolve_executable(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(UpgradeError::ResolveExecutable)
}
