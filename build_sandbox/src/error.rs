//! Error types for sandboxed builds and image management.

use std::path::PathBuf;

use container_runtime::EngineError;

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors surfaced by the image manager and the command runner.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Any engine failure, propagated unchanged (including
    /// `EngineError::Unavailable`).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The working directory could not be determined.
    #[error("could not resolve the current working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),

    /// The working directory must be an absolute host path.
    #[error("working directory {} is not an absolute path", .0.display())]
    RelativeWorkingDirectory(PathBuf),

    /// An execution request without a command.
    #[error("no command to execute")]
    EmptyCommand,

    /// The command ran to completion and returned a nonzero status.
    #[error("command '{command}' exited with status {code}")]
    NonZeroExit { command: String, code: i64 },

    /// The engine failed while the command was running; the exit code, if
    /// any, is not trustworthy.
    #[error("container engine failed while running '{command}' in container {container}: {source}")]
    WaitInfrastructure {
        command: String,
        container: String,
        #[source]
        source: EngineError,
    },

    /// Output could not be delivered to the caller's sinks.
    #[error("could not forward output of container {container}: {reason}")]
    OutputForwarding { container: String, reason: String },

    /// Local and upstream image identity could not be compared.
    #[error("could not check whether {reference} is up to date: {source}")]
    UpdateCheck {
        reference: String,
        #[source]
        source: EngineError,
    },
}

impl SandboxError {
    /// True when the engine could not be reached, however deep the cause.
    pub fn is_engine_unavailable(&self) -> bool {
        match self {
            SandboxError::Engine(e) => e.is_unavailable(),
            SandboxError::WaitInfrastructure { source, .. }
            | SandboxError::UpdateCheck { source, .. } => source.is_unavailable(),
            _ => false,
        }
    }

    /// Exit status of a command that failed normally.
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            SandboxError::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}
