//! Error types for the self-upgrade.

use std::path::PathBuf;

/// Result type alias for upgrade operations.
pub type Result<T> = std::result::Result<T, UpgradeError>;

/// Upgrade errors, ordered by how far the upgrade got.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    /// The latest published version could not be determined.
    #[error("could not determine the latest version from {url}: {reason}")]
    VersionLookup { url: String, reason: String },

    /// The running executable's location could not be resolved.
    #[error("could not determine the path of the running executable: {0}")]
    ResolveExecutable(#[source] std::io::Error),

    /// Network or storage failure before any file was touched.
    #[error("failed to download version {version}: {reason}")]
    DownloadFailed { version: String, reason: String },

    /// The current executable could not be moved aside. Nothing changed.
    #[error("could not replace {}; do you need to be root?: {source}", .path.display())]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The new binary could not be moved into place; the original was
    /// restored.
    #[error("could not install the new binary at {}, the original was restored: {source}", .path.display())]
    ReplaceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The original could not be restored after a failed replace.
    #[error(
        "could not install the new binary at {target} ({replace_error}) and could not restore \
         the original from {saved} ({rollback_error}); move {saved} back to {target} manually",
        target = .path.display(),
        saved = .backup.display()
    )]
    RollbackFailed {
        path: PathBuf,
        backup: PathBuf,
        replace_error: std::io::Error,
        rollback_error: std::io::Error,
    },

    /// A package manager command exited unsuccessfully.
    #[error("'{command}' failed: {reason}")]
    HostCommandFailed { command: String, reason: String },
}

impl UpgradeError {
    /// True when the installed binary is known to be intact, so running the
    /// upgrade again is safe.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, UpgradeError::RollbackFailed { .. })
    }

    /// True when an operator has to restore the executable by hand.
    pub fn requires_manual_recovery(&self) -> bool {
        matches!(self, UpgradeError::RollbackFailed { .. })
    }

    /// True when elevated permissions would likely help.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            UpgradeError::BackupFailed { source, .. } | UpgradeError::ReplaceFailed { source, .. } => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_rollback_failure_needs_operator() {
        let err = UpgradeError::RollbackFailed {
            path: PathBuf::from("/usr/local/bin/deployctl"),
            backup: PathBuf::from("/usr/local/bin/deployctl.bak"),
            replace_error: io::Error::new(io::ErrorKind::Other, "read-only file system"),
            rollback_error: io::Error::new(io::ErrorKind::Other, "device busy"),
        };
        assert!(!err.is_retryable());
        assert!(err.requires_manual_recovery());
        let msg = err.to_string();
        assert!(msg.contains("/usr/local/bin/deployctl.bak"));
        assert!(msg.contains("manually"));
    }

    #[test]
    fn test_replace_failure_is_retryable() {
        let err = UpgradeError::ReplaceFailed {
            path: PathBuf::from("/opt/deployctl"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.is_retryable());
        assert!(err.is_permission_denied());
        assert!(!err.requires_manual_recovery());
    }
}
