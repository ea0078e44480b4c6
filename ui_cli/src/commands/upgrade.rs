//! Upgrade command - refresh the build image and the CLI itself.

use clap::Args;
use self_upgrade::{UpgradeOutcome, VersionCheck};

use crate::commands::image::pull_with_progress;
use crate::context::{version, AppContext};
use crate::error::Result;
use crate::output;
use crate::prompt::ask;

/// Arguments for the upgrade command.
#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Answer yes to every prompt
    #[arg(short, long)]
    yes: bool,

    /// Leave the build image alone
    #[arg(long)]
    skip_image: bool,

    /// Leave the CLI alone
    #[arg(long)]
    skip_cli: bool,
}

/// Execute the upgrade command.
pub async fn execute(args: UpgradeArgs, ctx: &AppContext) -> Result<()> {
    if !args.skip_image {
        upgrade_image(ctx, args.yes).await?;
    }
    if !args.skip_cli {
        upgrade_cli(ctx, args.yes).await?;
    }
    Ok(())
}

async fn upgrade_image(ctx: &AppContext, yes: bool) -> Result<()> {
    let runtime = ctx.connect_engine().await?;
    let images = ctx.image_manager(runtime);
    let present = images.has_image(&ctx.image).await?;

    let question = if present {
        if !images.needs_update(&ctx.image).await? {
            output::success("Build image is up to date");
            return Ok(());
        }
        format!("Update the build image {}?", ctx.image)
    } else {
        output::info(&format!(
            "deployctl needs to download the build image {} in order to build projects.",
            ctx.image
        ));
        "Download the build image?".to_string()
    };

    if !ask(question, yes).await? {
        return Ok(());
    }
    pull_with_progress(&images, &ctx.image).await?;

    if !present {
        output::info("Run a build next with:\n\t'deployctl build -- <command>'");
    }
    Ok(())
}

async fn upgrade_cli(ctx: &AppContext, yes: bool) -> Result<()> {
    let upgrader = ctx.upgrader()?;

    let latest = match upgrader.check().await? {
        VersionCheck::Development => {
            output::warn("Skipping CLI upgrade on development version");
            return Ok(());
        }
        VersionCheck::UpToDate => {
            output::success(&format!("deployctl {} is already the latest version", version()));
            return Ok(());
        }
        VersionCheck::Available(latest) => latest,
    };

    let question = format!("A new version of deployctl is available ({}). Upgrade?", latest);
    if !ask(question, yes).await? {
        return Ok(());
    }

    output::info(&format!(
        "Upgrading deployctl from {} to {} ({})...",
        version(),
        latest,
        upgrader.channel()
    ));
    match upgrader.upgrade(&latest).await? {
        UpgradeOutcome::Replaced {
            path,
            version,
            leftover_backup,
        } => {
            output::success(&format!("Upgrade {} to {} complete", path.display(), version));
            if let Some(backup) = leftover_backup {
                output::warn(&format!("could not remove {}; it can be deleted", backup.display()));
            }
        }
        UpgradeOutcome::Homebrew { formula } => {
            output::success(&format!("Upgraded {} with Homebrew", formula));
        }
    }
    Ok(())
}
