//! User configuration for deployctl.
//!
//! Read from `<config dir>/deployctl/config.toml`. Every key is optional; a
//! missing file is the same as an empty one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Directory under the platform config dir holding deployctl's files.
pub const CONFIG_DIR_NAME: &str = "deployctl";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Placeholder in [`ReleaseConfig::download_url`] replaced by the version.
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("no configuration directory could be determined for this user")]
    NoConfigDir,
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub build_image: BuildImageConfig,
    pub engine: EngineConfig,
    pub release: ReleaseConfig,
}

/// The pinned image builds run in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildImageConfig {
    pub repository: String,
    pub tag: String,
}

impl Default for BuildImageConfig {
    fn default() -> Self {
        Self {
            repository: "deployctl/build".to_string(),
            tag: "latest".to_string(),
        }
    }
}

impl BuildImageConfig {
    /// `repository:tag`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Local container engine connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine socket; `DOCKER_HOST` and then the platform default apply
    /// when unset.
    pub socket: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket: None,
            request_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where new client releases are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// JSON document whose `tag_name` is the latest version.
    pub latest_url: String,
    /// Binary download URL containing `{version}`.
    pub download_url: String,
    pub homebrew_formula: String,
    pub timeout_secs: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            latest_url: "https://api.github.com/repos/deployctl/cli/releases/latest".to_string(),
            download_url: "https://github.com/deployctl/cli/releases/download/{version}/deployctl"
                .to_string(),
            homebrew_formula: "deployctl/tap/cli".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ReleaseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CliConfig {
    /// Load from `path`, or from the default location when `None`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load(&default_path()?),
        }
    }

    /// Load from `path`. A file that does not exist yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.build_image.repository.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "build_image.repository",
                reason: "must not be empty".to_string(),
            });
        }
        if self.build_image.tag.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "build_image.tag",
                reason: "must not be empty".to_string(),
            });
        }
        if self.engine.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.release.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "release.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.release.download_url.contains(VERSION_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue {
                field: "release.download_url",
                reason: format!("must contain {}", VERSION_PLACEHOLDER),
            });
        }
        Ok(())
    }
}

/// `<config dir>/deployctl/config.toml`.
pub fn default_path() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
