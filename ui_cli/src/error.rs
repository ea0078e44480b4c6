//! CLI error type and exit codes.

use build_sandbox::SandboxError;
use container_runtime::{EngineError, InvalidReference};
use self_upgrade::UpgradeError;
use user_config::ConfigError;

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// Exit code for failures without a more specific code.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code when the container engine cannot be reached.
pub const EXIT_ENGINE_UNAVAILABLE: u8 = 3;
/// Exit code when the executable must be restored by hand.
pub const EXIT_MANUAL_RECOVERY: u8 = 4;

/// CLI errors.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid build image in configuration: {0}")]
    BuildImage(#[from] InvalidReference),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error("build image {image} is not available locally")]
    ImageMissing { image: String },

    /// The build command ran and exited nonzero.
    #[error("{message}")]
    BuildFailed { message: String, code: i64 },

    #[error("could not read answer: {0}")]
    Prompt(#[source] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        CliError::Sandbox(SandboxError::Engine(err))
    }
}

impl CliError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Keep a nonzero exit as its own kind so its code reaches the shell.
    pub fn from_sandbox(err: SandboxError) -> Self {
        match err.exit_code() {
            Some(code) => CliError::BuildFailed {
                message: err.to_string(),
                code,
            },
            None => CliError::Sandbox(err),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::BuildFailed { code, .. } => build_exit_code(*code),
            CliError::Sandbox(e) if e.is_engine_unavailable() => EXIT_ENGINE_UNAVAILABLE,
            CliError::Upgrade(e) if e.requires_manual_recovery() => EXIT_MANUAL_RECOVERY,
            _ => EXIT_FAILURE,
        }
    }

    /// What the user can do about it, when there is something.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Sandbox(e) if e.is_engine_unavailable() => {
                Some("Verify that Docker is installed and running, then try again.")
            }
            CliError::ImageMissing { .. } => {
                Some("Download it with 'deployctl image pull' or 'deployctl upgrade'.")
            }
            CliError::Upgrade(e) if e.requires_manual_recovery() => Some(
                "deployctl may be missing from its install location; restore it from the .bak file named above.",
            ),
            CliError::Upgrade(e) if e.is_permission_denied() => {
                Some("Re-run the upgrade with permission to write the install location (e.g. as root).")
            }
            CliError::Upgrade(e) if e.is_retryable() => Some("The installed binary is unchanged; it is safe to retry."),
            _ => None,
        }
    }
}

/// Map a command's exit status to a process exit code that still signals
/// failure.
fn build_exit_code(code: i64) -> u8 {
    match u8::try_from(code) {
        Ok(0) | Err(_) => EXIT_FAILURE,
        Ok(code) => code,
    }
}
