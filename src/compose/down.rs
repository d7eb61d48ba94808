//! `compose down` invocation.

use tokio::process::Command;

use crate::compose::ComposeOptions;
use crate::error::{Error, Result};

/// Build the full `down` argument vector.
#[must_use]
pub fn down_args(options: &ComposeOptions, clean: bool) -> Vec<String> {
    let mut args = options.base_args();
    args.push("down".into());
    if clean {
        args.push("-v".into());
        args.push("--remove-orphans".into());
    }
    args
}

/// Run `down [-v --remove-orphans]`. Idempotent: tearing down a project that
/// no longer exists succeeds.
pub async fn run_down(options: &ComposeOptions, clean: bool) -> Result<()> {
    let args = down_args(options, clean);
    tracing::info!(project = %options.project_name, clean, "compose down");
    let output = Command::new("docker")
        .args(&args)
        .current_dir(&options.cwd)
        .output()
        .await
        .map_err(|e| Error::compose_exec("down", format!("failed to spawn docker: {e}")))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    // Nothing left to tear down counts as success.
    if stderr.contains("not found") || stderr.contains("No such") {
        tracing::debug!(project = %options.project_name, "project already gone");
        return Ok(());
    }
    Err(Error::compose_exec("down", stderr.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options() -> ComposeOptions {
        ComposeOptions {
            project_name: "lo1-shop".into(),
            file_args: vec![PathBuf::from("compose.yaml")],
            cwd: PathBuf::from("."),
        }
    }

    #[test]
    fn test_down_args_plain() {
        let args = down_args(&options(), false);
        assert_eq!(args.last().unwrap(), "down");
    }

    #[test]
    fn test_down_args_clean() {
        let args = down_args(&options(), true);
        let tail: Vec<_> = args.iter().skip_while(|a| *a != "down").collect();
        assert_eq!(tail, ["down", "-v", "--remove-orphans"]);
    }
}
