//! Image commands - inspect and download the build image.

use build_sandbox::{ImageLifecycleManager, SandboxError};
use clap::Subcommand;
use container_runtime::ImageReference;
use futures_util::StreamExt;
use tabled::Tabled;

use crate::context::AppContext;
use crate::error::Result;
use crate::output;
use crate::progress::PullRenderer;

/// Image subcommands.
#[derive(Subcommand, Debug)]
pub enum ImageCommand {
    /// Show whether the build image is present and current
    Status,
    /// Download the build image
    Pull,
}

#[derive(Debug, Tabled)]
struct ImageRow {
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Local")]
    local: String,
    #[tabled(rename = "Upstream")]
    upstream: String,
}

/// Execute an image subcommand.
pub async fn execute(command: ImageCommand, ctx: &AppContext) -> Result<()> {
    let runtime = ctx.connect_engine().await?;
    let images = ctx.image_manager(runtime);

    match command {
        ImageCommand::Status => status(&images, &ctx.image).await,
        ImageCommand::Pull => pull_with_progress(&images, &ctx.image).await,
    }
}

async fn status(images: &ImageLifecycleManager, image: &ImageReference) -> Result<()> {
    let present = images.has_image(image).await?;
    let upstream = if present {
        match images.needs_update(image).await {
            Ok(true) => "newer version available".to_string(),
            Ok(false) => "up to date".to_string(),
            Err(e) if e.is_engine_unavailable() => return Err(e.into()),
            Err(e) => {
                output::warn(&e.to_string());
                "unknown".to_string()
            }
        }
    } else {
        "-".to_string()
    };

    output::section("Build image");
    output::print_table(&[ImageRow {
        image: image.to_string(),
        local: if present { "present" } else { "missing" }.to_string(),
        upstream,
    }]);
    Ok(())
}

/// Pull `image`, drawing progress as it arrives.
pub async fn pull_with_progress(images: &ImageLifecycleManager, image: &ImageReference) -> Result<()> {
    output::info(&format!("Pulling {}", image));

    let mut progress = images.pull(image).await?;
    let mut renderer = PullRenderer::new();
    let mut failure: Option<SandboxError> = None;

    while let Some(event) = progress.next().await {
        match event {
            Ok(event) => renderer.render(&event),
            Err(e) => failure = Some(e),
        }
    }
    renderer.finish(failure.is_none());

    if let Some(e) = failure {
        return Err(e.into());
    }
    output::success(&format!("Successfully pulled {}", image));
    Ok(())
}
