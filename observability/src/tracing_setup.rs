//! Global `tracing` subscriber setup.

use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// How diagnostics are filtered and formatted.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,
    /// Raise the default filter to `debug`.
    pub verbose: bool,
    /// One JSON object per event instead of human-readable lines.
    pub json: bool,
    /// Colour the human-readable output.
    pub ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: "warn".to_string(),
            verbose: false,
            json: false,
            ansi: true,
        }
    }
}

impl TracingConfig {
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Directive applied when the environment sets none.
    pub fn default_directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.default_level
        }
    }

    /// `RUST_LOG` wins over the configured default.
    fn filter_directive(&self, from_env: Option<String>) -> String {
        match from_env {
            Some(directive) if !directive.trim().is_empty() => directive,
            _ => self.default_directive().to_string(),
        }
    }
}

/// Install the global subscriber, writing to stderr.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let directive = config.filter_directive(std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let filter = EnvFilter::try_new(&directive).map_err(|e| TracingError::InvalidFilter {
        directive: directive.clone(),
        reason: e.to_string(),
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_ansi(config.ansi)
                    .with_target(config.verbose),
            )
            .try_init()
    };

    installed.map_err(|_| TracingError::AlreadyInitialized)
}
