//! Build command - run a command in the build container.

use build_sandbox::ExecutionRequest;
use clap::Args;
use tracing::debug;

use crate::context::AppContext;
use crate::error::{CliError, Result};
use crate::notices;
use crate::output;

/// Arguments for the build command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Run this shell script through `sh -c` instead of a command
    #[arg(long, value_name = "SCRIPT", conflicts_with = "command")]
    shell: Option<String>,

    /// Skip the update and platform notices
    #[arg(long)]
    no_notices: bool,

    /// Command to run, after `--`
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

/// The request for `args`, run in the current directory as the current user.
fn build_request(args: &BuildArgs) -> Result<ExecutionRequest> {
    if args.shell.is_none() && args.command.is_empty() {
        return Err(CliError::invalid_argument(
            "nothing to run; pass a command after '--' or use --shell",
        ));
    }

    let base = ExecutionRequest::for_current_dir(args.command.clone())?;
    Ok(match &args.shell {
        Some(script) => ExecutionRequest::shell(script.clone(), base.working_directory, base.run_as),
        None => base,
    })
}

/// Execute the build command.
pub async fn execute(args: BuildArgs, ctx: &AppContext) -> Result<()> {
    let request = build_request(&args)?;

    let runtime = ctx.connect_engine().await?;
    let images = ctx.image_manager(runtime.clone());
    if !images.has_image(&ctx.image).await? {
        return Err(CliError::ImageMissing {
            image: ctx.image.to_string(),
        });
    }

    if !args.no_notices {
        let upgrader = ctx.upgrader().ok();
        if notices::print_build_notices(&images, &ctx.image, upgrader.as_ref()).await {
            eprintln!();
        }
    }

    output::info(&format!(
        "Running '{}' in {}",
        request.command_line(),
        ctx.image
    ));
    let result = ctx
        .runner(runtime)
        .execute(&request, tokio::io::stdout(), tokio::io::stderr())
        .await;
    debug!(exit_code = ?result.exit_code, "build finished");

    result.into_result().map_err(CliError::from_sandbox)?;
    output::success("Build completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: BuildArgs,
    }

    fn parse(argv: &[&str]) -> BuildArgs {
        let mut full = vec!["build"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_command_after_separator() {
        let args = parse(&["--", "make", "-j4"]);
        let req = build_request(&args).unwrap();
        assert_eq!(req.command, vec!["make", "-j4"]);
        assert!(req.working_directory.is_absolute());
    }

    #[test]
    fn test_shell_script() {
        let args = parse(&["--shell", "make && make test"]);
        let req = build_request(&args).unwrap();
        assert_eq!(req.command, vec!["sh", "-c", "make && make test"]);
    }

    #[test]
    fn test_nothing_to_run() {
        let args = parse(&[]);
        assert!(matches!(
            build_request(&args),
            Err(CliError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_shell_conflicts_with_command() {
        assert!(Harness::try_parse_from(["build", "--shell", "make", "--", "ls"]).is_err());
    }
}
