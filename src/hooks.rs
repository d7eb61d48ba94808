//! Lifecycle hook execution.
//!
//! Hooks are user-supplied shell snippets run at defined lifecycle points
//! (`preStart`, `postStart`, `preStop`, `postInfrastructure`, `postSetup`).
//! Output is streamed as it arrives and captured for the hook event.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::events::{EventSender, StreamKind};
use crate::runner::shell_command;
use crate::stream::forward_lines;

/// Where and with what environment a hook runs
#[derive(Debug, Clone)]
pub struct HookOptions {
    /// Working directory
    pub cwd: PathBuf,
    /// Extra environment; ambient environment inherited underneath
    pub env: BTreeMap<String, String>,
}

/// Outcome of a completed hook
#[derive(Debug, Clone)]
pub struct HookResult {
    /// Hook name
    pub hook_name: String,
    /// Exit code
    pub exit_code: i32,
    /// Captured stdout and stderr, in arrival order per stream
    pub output: String,
}

/// Run one hook command to completion.
///
/// Non-zero exit fails with [`Error::Hook`] carrying the code; a spawn
/// failure carries no code at all.
pub async fn execute_hook(
    hook_name: &str,
    command: &str,
    options: HookOptions,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<HookResult> {
    tracing::info!(hook = hook_name, "running hook");
    let mut cmd = shell_command(command);
    cmd.current_dir(&options.cwd)
        .envs(&options.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(hook = hook_name, error = %e, "hook failed to spawn");
            return Err(Error::hook(hook_name, None));
        }
    };

    let stdout_task = child
        .stdout
        .take()
        .map(|stdout| forward_lines(stdout, hook_name, StreamKind::Stdout, events.clone()));
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| forward_lines(stderr, hook_name, StreamKind::Stderr, events.clone()));

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        () = cancel.cancelled() => None,
    };
    let status = match waited {
        Some(status) => status.map_err(|_| Error::hook(hook_name, None))?,
        None => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(Error::orchestrator(format!("hook '{hook_name}' cancelled")));
        }
    };

    let mut output_lines = Vec::new();
    if let Some(task) = stdout_task {
        output_lines.extend(task.await.unwrap_or_default());
    }
    if let Some(task) = stderr_task {
        output_lines.extend(task.await.unwrap_or_default());
    }
    let output = output_lines.join("\n");

    let exit_code = status.code().unwrap_or(-1);
    if status.success() {
        Ok(HookResult {
            hook_name: hook_name.to_string(),
            exit_code,
            output,
        })
    } else {
        Err(Error::hook(hook_name, Some(exit_code)))
    }
}
