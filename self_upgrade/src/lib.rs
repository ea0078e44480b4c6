//! Self-upgrade of the deployctl executable.
//!
//! A release binary is downloaded next to the running executable and
//! swapped in with a backup-and-rollback two-phase rename. Homebrew
//! installs are upgraded through `brew` instead.

pub mod error;
pub mod homebrew;
pub mod release;
pub mod replace;
pub mod stage;
pub mod upgrader;
pub mod version;

pub use error::{Result, UpgradeError};
pub use release::{ReleaseEndpoints, ReleaseSource, DEFAULT_TIMEOUT};
pub use replace::{backup_path_for, Committed, FileOps, StdFileOps, UpgradeOperation};
pub use stage::{current_executable, StagedBinary};
pub use upgrader::{SelfUpgrader, UpgradeOutcome};
pub use version::{InstallChannel, VersionCheck, DEV_VERSION};
