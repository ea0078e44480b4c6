//! Observability for the deployctl client.
//!
//! Diagnostics go to stderr through `tracing`, leaving stdout to the build
//! command being run.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, TracingConfig, TracingError};

/// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn, Level};
