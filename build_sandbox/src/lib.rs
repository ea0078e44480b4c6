//! Sandboxed build execution.
//!
//! - `ImageLifecycleManager`: is the build image present, is it current, pull it
//! - `SandboxedCommandRunner`: run one command in an ephemeral container with
//!   the caller's working directory mounted at the same path
//!
//! Both talk to the engine through an injected `Arc<dyn ContainerRuntime>`.

pub mod completion;
pub mod error;
pub mod image_lifecycle;
pub mod output;
pub mod runner;

pub use completion::{first_signal, Completion};
pub use error::{Result, SandboxError};
pub use image_lifecycle::{ImageLifecycleManager, ImageStatus, PullProgress, PullProgressEvent};
pub use output::{route_frames, RouteFailure, RoutedBytes};
pub use runner::{
    host_user, ExecutionRequest, ExecutionResult, SandboxedCommandRunner, CONTAINER_NAME_PREFIX,
};
