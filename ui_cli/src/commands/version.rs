//! Version command.

use self_upgrade::VersionCheck;
use tracing::debug;

use crate::context::{version, AppContext};
use crate::notices::cli_version_notice;
use crate::output;

/// Print the version, and a notice when a newer release exists.
pub async fn execute(ctx: &AppContext) -> crate::error::Result<()> {
    println!("deployctl-{}", version());

    let upgrader = ctx.upgrader()?;
    match upgrader.check().await {
        Ok(VersionCheck::Available(latest)) => output::warn(&cli_version_notice(&latest)),
        Ok(_) => {}
        Err(e) => debug!(error = %e, "version lookup failed"),
    }
    Ok(())
}
