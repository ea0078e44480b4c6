//! Error types for container engine operations.

/// Result type alias for container engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by a [`ContainerRuntime`](crate::ContainerRuntime).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // =========================================================================
    // Connectivity
    // =========================================================================
    /// The engine socket is missing or the engine did not answer.
    #[error(
        "cannot connect to the container engine at {endpoint}: {message}; \
         verify that Docker is installed and running"
    )]
    Unavailable { endpoint: String, message: String },

    /// A bounded engine call did not complete in time.
    #[error("container engine did not answer {operation} within {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    // =========================================================================
    // Images
    // =========================================================================
    /// The referenced image does not exist locally or upstream.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// Pulling an image failed part-way or was rejected by the registry.
    #[error("failed to pull image '{reference}': {reason}")]
    PullFailed { reference: String, reason: String },

    /// The engine could not resolve the upstream digest of an image.
    #[error("registry lookup for '{reference}' failed: {reason}")]
    RegistryLookup { reference: String, reason: String },

    // =========================================================================
    // Container lifecycle
    // =========================================================================
    /// The engine rejected the container definition.
    #[error("failed to create container from image '{image}': {reason}")]
    CreateFailed { image: String, reason: String },

    /// The container was created but could not be started.
    #[error("failed to start container '{id}': {reason}")]
    StartFailed { id: String, reason: String },

    /// The engine failed while the container was running.
    #[error("engine failure while waiting for container '{id}': {reason}")]
    WaitFailed { id: String, reason: String },

    /// The attached output stream broke or carried an engine error frame.
    #[error("output stream of container '{id}' failed: {reason}")]
    OutputStream { id: String, reason: String },

    // =========================================================================
    // Protocol
    // =========================================================================
    /// Any other non-success answer from the engine API.
    #[error("container engine returned {status} for {operation}: {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// The engine answered with a body we could not decode.
    #[error("malformed engine response for {operation}: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
}

impl EngineError {
    /// True when the engine could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_mentions_remediation() {
        let err = EngineError::Unavailable {
            endpoint: "unix:///var/run/docker.sock".to_string(),
            message: "No such file or directory".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/run/docker.sock"));
        assert!(msg.contains("installed and running"));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_pull_failed_display() {
        let err = EngineError::PullFailed {
            reference: "deployctl/build:latest".to_string(),
            reason: "manifest unknown".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to pull image 'deployctl/build:latest': manifest unknown"
        );
        assert!(!err.is_unavailable());
    }
}
