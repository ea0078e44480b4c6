//! Container engine access for the build sandbox.
//!
//! This crate provides the `ContainerRuntime` trait and its implementations:
//! - `DockerEngine`: Docker Engine API over the local unix socket
//! - `MockRuntime`: scripted in-memory engine for tests (requires `mock-runtime` feature)
//!
//! The `demux` module turns the engine's attached stdout/stderr output into
//! tagged frames; routing them is up to the caller.

pub mod demux;
pub mod docker;
pub mod engine;
pub mod error;
pub mod image;

#[cfg(feature = "mock-runtime")]
pub mod mock;

// Re-export common types
pub use demux::{LogFrame, StreamSource};
pub use docker::{DockerConfig, DockerEngine};
pub use engine::{
    BindMount, ContainerId, ContainerRuntime, ContainerUser, ContainerWait,
    CreateContainerOptions, LogStream, PullStream,
};
pub use error::{EngineError, Result};
pub use image::{ImageReference, InvalidReference};

#[cfg(feature = "mock-runtime")]
pub use mock::{MockRuntime, ScriptedOutcome, ScriptedRun};
