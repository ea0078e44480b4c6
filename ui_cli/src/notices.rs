//! Advisory warnings printed before a build.

use build_sandbox::{ImageLifecycleManager, ImageStatus};
use container_runtime::ImageReference;
use self_upgrade::{SelfUpgrader, VersionCheck};
use tracing::debug;

use crate::output;

/// Warning for hosts the build image is not built for.
pub fn arch_notice(arch: &str, os: &str) -> Option<String> {
    match (arch, os) {
        ("x86_64", _) => None,
        ("aarch64", "macos") => Some(
            "the build container is known not to run well on Apple silicon Macs; \
             please try on a 64-bit Intel/AMD based system if possible."
                .to_string(),
        ),
        (arch, _) => Some(format!(
            "the build container has not been tested on your CPU ({}); \
             please try on a 64-bit Intel/AMD based system if possible.",
            arch
        )),
    }
}

pub fn stale_image_notice(image: &ImageReference) -> String {
    format!(
        "a new version of the build image {} is available. Please upgrade via 'deployctl upgrade'.",
        image
    )
}

pub fn cli_version_notice(latest: &str) -> String {
    format!(
        "a new version of deployctl is available ({}). Please upgrade via 'deployctl upgrade'.",
        latest
    )
}

/// Print every notice that applies. Lookups that fail are skipped silently;
/// returns whether anything was printed.
pub async fn print_build_notices(
    images: &ImageLifecycleManager,
    image: &ImageReference,
    upgrader: Option<&SelfUpgrader>,
) -> bool {
    let mut printed = false;

    if let Some(upgrader) = upgrader {
        match upgrader.check().await {
            Ok(VersionCheck::Available(latest)) => {
                output::warn(&cli_version_notice(&latest));
                printed = true;
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "skipping version notice"),
        }
    }

    match images.status(image).await {
        Ok(ImageStatus::Stale) => {
            output::warn(&stale_image_notice(image));
            printed = true;
        }
        Ok(_) => {}
        Err(e) => debug!(error = %e, "skipping image notice"),
    }

    if let Some(msg) = arch_notice(std::env::consts::ARCH, std::env::consts::OS) {
        output::warn(&msg);
        printed = true;
    }

    printed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_notice() {
        assert!(arch_notice("x86_64", "linux").is_none());
        assert!(arch_notice("aarch64", "macos").is_some_and(|m| m.contains("Apple silicon")));
        assert!(arch_notice("riscv64", "linux").is_some_and(|m| m.contains("riscv64")));
    }

    #[test]
    fn test_version_notice_names_version() {
        assert!(cli_version_notice("v1.4.0").contains("v1.4.0"));
    }
}
