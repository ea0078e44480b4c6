//! deployctl - sandboxed builds and self-upgrade for the deployment platform.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use observability::{init_tracing, TracingConfig};

mod commands;
mod context;
mod error;
mod notices;
mod output;
mod progress;
mod prompt;

use commands::{build::BuildArgs, image::ImageCommand, upgrade::UpgradeArgs};
use context::AppContext;
use error::{CliError, EXIT_FAILURE};

#[derive(Parser)]
#[command(name = "deployctl")]
#[command(version = context::version())]
#[command(about = "Run builds in the pinned build container and keep deployctl up to date", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(long, global = true, env = "DEPLOYCTL_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Show debug diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit diagnostics as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command inside the build container
    Build(BuildArgs),

    /// Build image management
    Image {
        #[command(subcommand)]
        action: ImageCommand,
    },

    /// Update the build image and deployctl itself
    Upgrade(UpgradeArgs),

    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = TracingConfig::default()
        .verbose(cli.verbose)
        .json(cli.log_json);
    if let Err(e) = init_tracing(tracing) {
        output::warn(&format!("diagnostics disabled: {}", e));
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = AppContext::load(cli.config)?;

    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &ctx).await?,
        Commands::Image { action } => commands::image::execute(action, &ctx).await?,
        Commands::Upgrade(args) => commands::upgrade::execute(args, &ctx).await?,
        Commands::Version => commands::version::execute(&ctx).await?,
    }
    Ok(())
}

/// Print `err` with its hint and pick the exit code.
fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<CliError>() {
        Some(cli_err) => {
            output::error(&cli_err.to_string());
            if let Some(hint) = cli_err.hint() {
                output::hint(hint);
            }
            ExitCode::from(cli_err.exit_code())
        }
        None => {
            output::error(&format!("{:#}", err));
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
