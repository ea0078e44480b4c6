//! Execution of one command inside an ephemeral build container.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use container_runtime::{
    BindMount, ContainerRuntime, ContainerUser, CreateContainerOptions, ImageReference,
};

use crate::completion::{first_signal, Completion};
use crate::error::{Result, SandboxError};
use crate::output::{route_frames, RouteFailure, RoutedBytes};

/// Prefix of every build container's name.
pub const CONTAINER_NAME_PREFIX: &str = "deployctl-build-";

/// One command to run in the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub command: Vec<String>,
    /// Absolute host path, mounted at the same path inside the container.
    pub working_directory: PathBuf,
    pub run_as: ContainerUser,
}

impl ExecutionRequest {
    pub fn new(
        command: Vec<String>,
        working_directory: impl Into<PathBuf>,
        run_as: ContainerUser,
    ) -> Self {
        Self {
            command,
            working_directory: working_directory.into(),
            run_as,
        }
    }

    /// Run `command` in the process's working directory as the invoking user.
    pub fn for_current_dir(command: Vec<String>) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(SandboxError::WorkingDirectory)?;
        Ok(Self::new(command, cwd, host_user()))
    }

    /// Run `script` through `sh -c`.
    pub fn shell(
        script: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        run_as: ContainerUser,
    ) -> Self {
        let command = vec!["sh".to_string(), "-c".to_string(), script.into()];
        Self::new(command, working_directory, run_as)
    }

    /// The command as a single line, for messages.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    fn validate(&self) -> Result<()> {
        if self.command.is_empty() {
            return Err(SandboxError::EmptyCommand);
        }
        if !self.working_directory.is_absolute() {
            return Err(SandboxError::RelativeWorkingDirectory(
                self.working_directory.clone(),
            ));
        }
        Ok(())
    }
}

/// uid:gid of the invoking host user.
#[cfg(unix)]
pub fn host_user() -> ContainerUser {
    ContainerUser {
        uid: nix::unistd::getuid().as_raw(),
        gid: nix::unistd::getgid().as_raw(),
    }
}

#[cfg(not(unix))]
pub fn host_user() -> ContainerUser {
    ContainerUser { uid: 0, gid: 0 }
}

/// Outcome of one execution.
///
/// `exit_code` is set whenever the command ran to completion. `error` is
/// set for a nonzero exit (`NonZeroExit`, alongside the code) and for every
/// infrastructure failure, in which case no exit code is reported.
#[derive(Debug)]
pub struct ExecutionResult {
    pub exit_code: Option<i64>,
    pub error: Option<SandboxError>,
}

impl ExecutionResult {
    fn exited(command: &str, code: i64) -> Self {
        let error = (code != 0).then(|| SandboxError::NonZeroExit {
            command: command.to_string(),
            code,
        });
        Self {
            exit_code: Some(code),
            error,
        }
    }

    fn failed(error: SandboxError) -> Self {
        Self {
            exit_code: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0) && self.error.is_none()
    }

    /// True when the command never produced a trustworthy exit code.
    pub fn is_infrastructure_failure(&self) -> bool {
        self.exit_code.is_none()
    }

    /// `Ok(0)` on success, otherwise the error.
    pub fn into_result(self) -> Result<i64> {
        match (self.exit_code, self.error) {
            (_, Some(err)) => Err(err),
            (Some(code), None) => Ok(code),
            // Unreachable by construction; report as a broken stream.
            (None, None) => Err(SandboxError::OutputForwarding {
                container: String::new(),
                reason: "execution produced no result".to_string(),
            }),
        }
    }
}

/// Runs build commands in throwaway containers of one pinned image.
#[derive(Clone)]
pub struct SandboxedCommandRunner {
    runtime: Arc<dyn ContainerRuntime>,
    image: ImageReference,
}

impl SandboxedCommandRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: ImageReference) -> Self {
        Self { runtime, image }
    }

    pub fn image(&self) -> &ImageReference {
        &self.image
    }

    /// Run `request`, forwarding its output to `stdout` and `stderr` while
    /// it runs.
    pub async fn execute<O, E>(&self, request: &ExecutionRequest, stdout: O, stderr: E) -> ExecutionResult
    where
        O: AsyncWrite + Unpin + Send + 'static,
        E: AsyncWrite + Unpin + Send + 'static,
    {
        let command = request.command_line();
        match self.run(request, &command, stdout, stderr).await {
            Ok(code) => {
                info!(command = %command, code, "build command finished");
                ExecutionResult::exited(&command, code)
            }
            Err(err) => {
                warn!(command = %command, error = %err, "build command failed to run");
                ExecutionResult::failed(err)
            }
        }
    }

    async fn run<O, E>(
        &self,
        request: &ExecutionRequest,
        command: &str,
        stdout: O,
        stderr: E,
    ) -> Result<i64>
    where
        O: AsyncWrite + Unpin + Send + 'static,
        E: AsyncWrite + Unpin + Send + 'static,
    {
        request.validate()?;

        let options = self.container_options(request);
        let id = self.runtime.create_container(&options).await?;
        info!(
            container = %id,
            image = %self.image,
            dir = %request.working_directory.display(),
            user = %request.run_as,
            "created build container"
        );

        // Output and exit wait are registered before start so a container
        // that exits at once loses neither.
        let prepared = async {
            let logs = self.runtime.stream_logs(&id).await?;
            let wait = self.runtime.await_completion(&id).await?;
            self.runtime.start_container(&id).await?;
            Ok::<_, SandboxError>((logs, wait))
        };
        let (logs, wait) = match prepared.await {
            Ok(ready) => ready,
            Err(err) => {
                self.discard(&id).await;
                return Err(err);
            }
        };
        debug!(container = %id, "build container running");

        let demux = spawn_router(logs, stdout, stderr);
        let (errored, exited) = wait.into_signals();

        match first_signal(errored, exited).await {
            Completion::Errored(source) => {
                demux.abort();
                Err(SandboxError::WaitInfrastructure {
                    command: command.to_string(),
                    container: id,
                    source,
                })
            }
            Completion::Exited(code) => {
                let routed = drain(demux, &id).await?;
                debug!(
                    container = %id,
                    stdout_bytes = routed.stdout,
                    stderr_bytes = routed.stderr,
                    "output drained"
                );
                Ok(code)
            }
        }
    }

    fn container_options(&self, request: &ExecutionRequest) -> CreateContainerOptions {
        let dir: &Path = &request.working_directory;
        CreateContainerOptions {
            image: self.image.clone(),
            command: request.command.clone(),
            mounts: vec![BindMount::same_path(dir)],
            working_dir: dir.to_path_buf(),
            user: request.run_as,
            auto_remove: true,
            name: Some(format!("{}{}", CONTAINER_NAME_PREFIX, Uuid::new_v4())),
        }
    }

    /// Remove a container that was created but never ran.
    async fn discard(&self, id: &str) {
        if let Err(e) = self.runtime.remove_container(id).await {
            warn!(container = %id, error = %e, "could not remove unstarted container");
        }
    }
}

fn spawn_router<O, E>(
    logs: container_runtime::LogStream,
    mut stdout: O,
    mut stderr: E,
) -> JoinHandle<std::result::Result<RoutedBytes, RouteFailure>>
where
    O: AsyncWrite + Unpin + Send + 'static,
    E: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move { route_frames(logs, &mut stdout, &mut stderr).await })
}

/// Wait for the router to deliver the rest of the output.
async fn drain(
    demux: JoinHandle<std::result::Result<RoutedBytes, RouteFailure>>,
    container: &str,
) -> Result<RoutedBytes> {
    match demux.await {
        Ok(Ok(routed)) => Ok(routed),
        Ok(Err(failure)) => Err(SandboxError::OutputForwarding {
            container: container.to_string(),
            reason: failure.to_string(),
        }),
        Err(join) => Err(SandboxError::OutputForwarding {
            container: container.to_string(),
            reason: format!("output task ended abnormally: {}", join),
        }),
    }
}
