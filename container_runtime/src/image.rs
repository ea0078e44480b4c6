//! Image references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tag used when a reference does not name one.
pub const DEFAULT_TAG: &str = "latest";

/// A `repository:tag` pair identifying one build image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    repository: String,
    tag: String,
}

/// Error returned when a string is not a usable image reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid image reference '{reference}': {reason}")]
pub struct InvalidReference {
    pub reference: String,
    pub reason: &'static str,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Parse `repo[:tag]`.
    ///
    /// A colon that belongs to a registry port (`host:5000/repo`) is not a
    /// tag separator; only a colon after the last `/` is. Digest references
    /// (`repo@sha256:...`) are rejected since the build image is pinned by tag.
    pub fn parse(reference: &str) -> Result<Self, InvalidReference> {
        let invalid = |reason| InvalidReference {
            reference: reference.to_string(),
            reason,
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty reference"));
        }
        if trimmed.contains('@') {
            return Err(invalid("digest references are not supported"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let last_slash = trimmed.rfind('/').map(|i| i + 1).unwrap_or(0);
        match trimmed[last_slash..].rfind(':') {
            Some(offset) => {
                let split = last_slash + offset;
                let (repository, tag) = (&trimmed[..split], &trimmed[split + 1..]);
                if repository.is_empty() {
                    return Err(invalid("missing repository"));
                }
                if tag.is_empty() {
                    return Err(invalid("empty tag"));
                }
                Ok(Self::new(repository, tag))
            }
            None => Ok(Self::new(trimmed, DEFAULT_TAG)),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = InvalidReference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
