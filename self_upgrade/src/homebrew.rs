//! Upgrades for Homebrew installs, delegated to `brew`.

use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use crate::error::{Result, UpgradeError};

/// Commands that upgrade `formula`, in order.
pub fn upgrade_commands(formula: &str) -> Vec<Vec<String>> {
    vec![
        vec!["brew".to_string(), "update".to_string()],
        vec!["brew".to_string(), "install".to_string(), formula.to_string()],
    ]
}

/// Run `argv` on the host with the terminal attached.
pub async fn run_host_command(argv: &[String]) -> Result<()> {
    let command_line = argv.join(" ");
    let (program, args) = argv.split_first().ok_or_else(|| UpgradeError::HostCommandFailed {
        command: command_line.clone(),
        reason: "empty command".to_string(),
    })?;

    info!(command = %command_line, "running host command");
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| UpgradeError::HostCommandFailed {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(UpgradeError::HostCommandFailed {
            command: command_line,
            reason: match status.code() {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by a signal".to_string(),
            },
        })
    }
}

/// `brew update`, then `brew install <formula>`.
pub async fn upgrade(formula: &str) -> Result<()> {
    for argv in upgrade_commands(formula) {
        run_host_command(&argv).await?;
    }
    Ok(())
}
