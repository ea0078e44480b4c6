//! In-memory container engine for tests.
//!
//! Containers are scripted per command: the mock splits the scripted output
//! into small attached-output chunks and feeds them through the same
//! [`demux::frames`] mapping the real engine uses.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::sync::Notify;

use crate::demux::{self, StreamSource};
use crate::engine::{
    ContainerId, ContainerRuntime, ContainerWait, CreateContainerOptions, LogStream, PullStream,
};
use crate::error::{EngineError, Result};
use crate::image::ImageReference;

/// How a scripted container finishes.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Normal exit with this status code.
    Exit(i64),
    /// The engine fails while waiting. An exit code of 0 is also reported,
    /// as a real engine may, and must not be trusted.
    WaitError(String),
}

/// Output and outcome of one scripted container.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub output: Vec<(StreamSource, Vec<u8>)>,
    pub outcome: ScriptedOutcome,
    /// Size of the chunks each output is delivered in.
    pub chunk_size: usize,
    /// When set, the outcome is held back until the gate is notified.
    pub gate: Option<Arc<Notify>>,
}

impl ScriptedRun {
    pub fn exit(code: i64) -> Self {
        Self {
            output: Vec::new(),
            outcome: ScriptedOutcome::Exit(code),
            chunk_size: 7,
            gate: None,
        }
    }

    /// Exit with `code` only once `gate` is notified; output is delivered
    /// before that.
    pub fn exit_after(code: i64, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::exit(code)
        }
    }

    pub fn wait_error(reason: impl Into<String>) -> Self {
        Self {
            outcome: ScriptedOutcome::WaitError(reason.into()),
            ..Self::exit(0)
        }
    }

    pub fn stdout(mut self, data: impl AsRef<[u8]>) -> Self {
        self.output
            .push((StreamSource::Stdout, data.as_ref().to_vec()));
        self
    }

    pub fn stderr(mut self, data: impl AsRef<[u8]>) -> Self {
        self.output
            .push((StreamSource::Stderr, data.as_ref().to_vec()));
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}

/// Scripted result of pulling one image.
#[derive(Debug, Clone, Default)]
struct ScriptedPull {
    lines: Vec<Bytes>,
    /// Transport failure raised after the lines were delivered.
    failure: Option<String>,
    /// Digest the local image carries once the pull completes.
    digest: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    unavailable: bool,
    create_failure: Option<String>,
    start_failure: Option<String>,
    local_images: HashMap<ImageReference, Vec<String>>,
    registry_digests: HashMap<ImageReference, String>,
    pulls: HashMap<ImageReference, ScriptedPull>,
    scripts: HashMap<Vec<String>, ScriptedRun>,
    containers: HashMap<ContainerId, ScriptedRun>,
    created: Vec<CreateContainerOptions>,
    started: Vec<ContainerId>,
    removed: Vec<ContainerId>,
    next_id: u64,
}

/// Scriptable [`ContainerRuntime`].
#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.state().unavailable {
            return Err(EngineError::Unavailable {
                endpoint: "mock://engine".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    // ==================== Scripting ====================

    /// Every call fails as if the engine socket were absent.
    pub fn unavailable(self) -> Self {
        self.state().unavailable = true;
        self
    }

    /// Container creation is rejected with `reason`.
    pub fn fail_create(self, reason: impl Into<String>) -> Self {
        self.state().create_failure = Some(reason.into());
        self
    }

    /// Starting any container is rejected with `reason`.
    pub fn fail_start(self, reason: impl Into<String>) -> Self {
        self.state().start_failure = Some(reason.into());
        self
    }

    /// An image present locally with the given repo digest.
    pub fn with_local_image(self, image: ImageReference, digest: impl Into<String>) -> Self {
        let digest = format!("{}@{}", image.repository(), digest.into());
        self.state().local_images.insert(image, vec![digest]);
        self
    }

    /// A locally built image that carries no repo digest.
    pub fn with_untracked_local_image(self, image: ImageReference) -> Self {
        self.state().local_images.insert(image, Vec::new());
        self
    }

    /// The digest currently published upstream for `image`.
    pub fn with_registry_digest(self, image: ImageReference, digest: impl Into<String>) -> Self {
        self.state()
            .registry_digests
            .insert(image, digest.into());
        self
    }

    /// Raw status lines a pull of `image` produces; on completion the
    /// image becomes present locally.
    pub fn with_pull<L: Into<Bytes>>(self, image: ImageReference, lines: Vec<L>) -> Self {
        self.state().pulls.insert(
            image,
            ScriptedPull {
                lines: lines.into_iter().map(Into::into).collect(),
                ..ScriptedPull::default()
            },
        );
        self
    }

    /// A pull that delivers `lines` and then breaks with `failure`.
    pub fn with_failing_pull<L: Into<Bytes>>(
        self,
        image: ImageReference,
        lines: Vec<L>,
        failure: impl Into<String>,
    ) -> Self {
        self.state().pulls.insert(
            image,
            ScriptedPull {
                lines: lines.into_iter().map(Into::into).collect(),
                failure: Some(failure.into()),
                digest: None,
            },
        );
        self
    }

    /// Script the container that runs exactly `command`. Unscripted
    /// commands exit 0 without output.
    pub fn script<S: AsRef<str>>(self, command: &[S], run: ScriptedRun) -> Self {
        let key = command.iter().map(|s| s.as_ref().to_string()).collect();
        self.state().scripts.insert(key, run);
        self
    }

    // ==================== Inspection ====================

    /// Options of every container created so far.
    pub fn created(&self) -> Vec<CreateContainerOptions> {
        self.state().created.clone()
    }

    /// Ids of every container started so far.
    pub fn started(&self) -> Vec<ContainerId> {
        self.state().started.clone()
    }

    /// Ids of every container removed explicitly so far.
    pub fn removed(&self) -> Vec<ContainerId> {
        self.state().removed.clone()
    }

    fn run_for(&self, id: &str) -> Result<ScriptedRun> {
        self.state()
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::Api {
                operation: "container",
                status: 404,
                message: format!("No such container: {}", id),
            })
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_container(&self, options: &CreateContainerOptions) -> Result<ContainerId> {
        self.check_available()?;
        let mut state = self.state();

        if let Some(reason) = &state.create_failure {
            return Err(EngineError::CreateFailed {
                image: options.image.to_string(),
                reason: reason.clone(),
            });
        }
        if !state.local_images.contains_key(&options.image) {
            return Err(EngineError::ImageNotFound(options.image.to_string()));
        }

        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        let run = state
            .scripts
            .get(&options.command)
            .cloned()
            .unwrap_or_else(|| ScriptedRun::exit(0));
        state.containers.insert(id.clone(), run);
        state.created.push(options.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.check_available()?;
        self.run_for(id).map_err(|e| EngineError::StartFailed {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        let mut state = self.state();
        if let Some(reason) = &state.start_failure {
            return Err(EngineError::StartFailed {
                id: id.to_string(),
                reason: reason.clone(),
            });
        }
        state.started.push(id.to_string());
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state();
        state.containers.remove(id);
        state.removed.push(id.to_string());
        Ok(())
    }

    async fn stream_logs(&self, id: &str) -> Result<LogStream> {
        self.check_available()?;
        let run = self.run_for(id)?;

        let mut chunks: Vec<std::result::Result<LogOutput, BollardError>> = Vec::new();
        for (source, data) in &run.output {
            for piece in data.chunks(run.chunk_size) {
                let message = Bytes::copy_from_slice(piece);
                chunks.push(Ok(match source {
                    StreamSource::Stdin => LogOutput::StdIn { message },
                    StreamSource::Stdout => LogOutput::StdOut { message },
                    StreamSource::Stderr => LogOutput::StdErr { message },
                    StreamSource::System => LogOutput::Console { message },
                }));
            }
        }

        Ok(demux::frames(id, stream::iter(chunks)))
    }

    async fn await_completion(&self, id: &str) -> Result<ContainerWait> {
        self.check_available()?;
        let run = self.run_for(id)?;

        let (exit_tx, error_tx, wait) = ContainerWait::channel();
        match run.outcome {
            ScriptedOutcome::Exit(code) => match run.gate {
                Some(gate) => {
                    tokio::spawn(async move {
                        gate.notified().await;
                        let _ = exit_tx.send(code);
                    });
                }
                None => {
                    let _ = exit_tx.send(code);
                }
            },
            ScriptedOutcome::WaitError(reason) => {
                let _ = error_tx.send(EngineError::WaitFailed {
                    id: id.to_string(),
                    reason,
                });
                let _ = exit_tx.send(0);
            }
        }
        Ok(wait)
    }

    async fn list_local_images(&self) -> Result<HashSet<ImageReference>> {
        self.check_available()?;
        Ok(self.state().local_images.keys().cloned().collect())
    }

    async fn local_digests(&self, image: &ImageReference) -> Result<Vec<String>> {
        self.check_available()?;
        self.state()
            .local_images
            .get(image)
            .cloned()
            .ok_or_else(|| EngineError::ImageNotFound(image.to_string()))
    }

    async fn registry_digest(&self, image: &ImageReference) -> Result<String> {
        self.check_available()?;
        self.state()
            .registry_digests
            .get(image)
            .cloned()
            .ok_or_else(|| EngineError::RegistryLookup {
                reference: image.to_string(),
                reason: "registry unreachable".to_string(),
            })
    }

    async fn pull_image(&self, image: &ImageReference) -> Result<PullStream> {
        self.check_available()?;
        let mut state = self.state();
        let pull = state
            .pulls
            .get(image)
            .cloned()
            .ok_or_else(|| EngineError::ImageNotFound(image.to_string()))?;

        let mut items: Vec<Result<Bytes>> = pull.lines.into_iter().map(Ok).collect();
        match pull.failure {
            Some(reason) => items.push(Err(EngineError::PullFailed {
                reference: image.to_string(),
                reason,
            })),
            None => {
                // Completion makes the image present, as a real pull would.
                let digest = pull
                    .digest
                    .or_else(|| state.registry_digests.get(image).cloned())
                    .map(|d| format!("{}@{}", image.repository(), d));
                state
                    .local_images
                    .insert(image.clone(), digest.into_iter().collect());
            }
        }

        Ok(stream::iter(items).boxed())
    }
}
