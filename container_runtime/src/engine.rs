//! The capability surface the build sandbox needs from a container engine.

use std::collections::HashSet;
use std::fmt;
use std::future::{pending, Future};
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use tokio::sync::oneshot;

use crate::demux::LogFrame;
use crate::error::{EngineError, Result};
use crate::image::ImageReference;

/// Identifier assigned by the engine to a created container.
pub type ContainerId = String;

/// Demultiplexed output of a running container, ending when it exits.
pub type LogStream = BoxStream<'static, Result<LogFrame>>;

/// Raw status lines of an image pull, newline stripped. A line is not
/// guaranteed to be valid UTF-8, let alone JSON.
pub type PullStream = BoxStream<'static, Result<Bytes>>;

/// A host directory exposed inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub read_only: bool,
}

impl BindMount {
    /// Mount `path` at the identical location inside the container.
    pub fn same_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            host_path: path.clone(),
            container_path: path,
            read_only: false,
        }
    }

    /// Engine `Binds` syntax: `host:container[:ro]`.
    pub fn to_bind_spec(&self) -> String {
        let mut spec = format!(
            "{}:{}",
            self.host_path.display(),
            self.container_path.display()
        );
        if self.read_only {
            spec.push_str(":ro");
        }
        spec
    }
}

/// Numeric identity the container process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerUser {
    pub uid: u32,
    pub gid: u32,
}

impl fmt::Display for ContainerUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// Options for creating a container.
#[derive(Debug, Clone)]
pub struct CreateContainerOptions {
    pub image: ImageReference,
    pub command: Vec<String>,
    pub mounts: Vec<BindMount>,
    pub working_dir: PathBuf,
    pub user: ContainerUser,
    /// Let the engine remove the container as soon as it exits.
    pub auto_remove: bool,
    pub name: Option<String>,
}

/// The two completion signals of a container.
///
/// Exactly one of them is expected to fire. A sender dropped without
/// firing never resolves its side, so the other signal decides.
pub struct ContainerWait {
    pub exited: oneshot::Receiver<i64>,
    pub errored: oneshot::Receiver<EngineError>,
}

impl ContainerWait {
    /// Create a wait handle together with the senders that complete it.
    pub fn channel() -> (oneshot::Sender<i64>, oneshot::Sender<EngineError>, Self) {
        let (exit_tx, exited) = oneshot::channel();
        let (error_tx, errored) = oneshot::channel();
        (exit_tx, error_tx, Self { exited, errored })
    }

    /// Split into `(errored, exited)` futures for racing.
    pub fn into_signals(
        self,
    ) -> (
        impl Future<Output = EngineError> + Send,
        impl Future<Output = i64> + Send,
    ) {
        let errored = async move {
            match self.errored.await {
                Ok(err) => err,
                Err(_) => pending().await,
            }
        };
        let exited = async move {
            match self.exited.await {
                Ok(code) => code,
                Err(_) => pending().await,
            }
        };
        (errored, exited)
    }
}

/// Operations on a local container engine.
///
/// Implementations hold nothing beyond a connection handle; any failure
/// to reach the engine is reported as [`EngineError::Unavailable`].
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create (but do not start) a container.
    async fn create_container(&self, options: &CreateContainerOptions) -> Result<ContainerId>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Force-remove a container. Removing one that is already gone succeeds.
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Combined stdout/stderr of the container. May be opened before start;
    /// the stream ends when the container exits.
    async fn stream_logs(&self, id: &str) -> Result<LogStream>;

    /// Register for the container's completion. Must be called before
    /// start for auto-removed containers.
    async fn await_completion(&self, id: &str) -> Result<ContainerWait>;

    /// All `repository:tag` references present locally.
    async fn list_local_images(&self) -> Result<HashSet<ImageReference>>;

    /// Repo digests (`repo@sha256:...`) of the locally cached image.
    async fn local_digests(&self, image: &ImageReference) -> Result<Vec<String>>;

    /// Manifest digest currently published upstream for `image`.
    async fn registry_digest(&self, image: &ImageReference) -> Result<String>;

    /// Start pulling `image`; yields the engine's raw status lines.
    async fn pull_image(&self, image: &ImageReference) -> Result<PullStream>;
}
