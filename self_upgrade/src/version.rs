//! Version policy: development builds, install channels, update checks.

use std::fmt;

/// Version string of builds made outside the release pipeline.
pub const DEV_VERSION: &str = "v0.devbuild";

/// Suffix marking a build installed through Homebrew.
pub const HOMEBREW_SUFFIX: char = 'b';

/// How the running binary was installed, which decides how it is upgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallChannel {
    /// A release binary downloaded directly; replaced in place.
    Direct,
    /// Installed by Homebrew; upgraded by Homebrew.
    Homebrew,
}

impl InstallChannel {
    pub fn of(version: &str) -> Self {
        if version.ends_with(HOMEBREW_SUFFIX) {
            InstallChannel::Homebrew
        } else {
            InstallChannel::Direct
        }
    }

    /// The published release tag as this channel names it.
    pub fn version_for(&self, release_tag: &str) -> String {
        match self {
            InstallChannel::Direct => release_tag.to_string(),
            InstallChannel::Homebrew => format!("{}{}", release_tag, HOMEBREW_SUFFIX),
        }
    }
}

impl fmt::Display for InstallChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallChannel::Direct => write!(f, "release download"),
            InstallChannel::Homebrew => write!(f, "Homebrew"),
        }
    }
}

/// Result of comparing the running version with the latest release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// Development builds are never upgraded.
    Development,
    UpToDate,
    Available(String),
}

impl VersionCheck {
    /// Any difference from the latest release counts as an update; release
    /// tags are not ordered.
    pub fn compare(current: &str, latest: &str) -> Self {
        if is_development(current) {
            VersionCheck::Development
        } else if current == latest {
            VersionCheck::UpToDate
        } else {
            VersionCheck::Available(latest.to_string())
        }
    }
}

pub fn is_development(version: &str) -> bool {
    version == DEV_VERSION
}
