//! `compose up` invocation with streamed output and cancellation.

use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::compose::ComposeOptions;
use crate::error::{Error, Result};
use crate::events::{EventSender, StreamKind};
use crate::stream::forward_lines;

/// Service name attached to compose tool output lines
pub(crate) const COMPOSE_OUTPUT_SERVICE: &str = "compose";

/// Build the full `up` argument vector.
#[must_use]
pub fn up_args(options: &ComposeOptions, services: &[String]) -> Vec<String> {
    let mut args = options.base_args();
    args.push("up".into());
    args.push("-d".into());
    // Readiness is gated separately via `wait` so init tasks can be treated
    // as ready-on-exit; compose's own --wait cannot express that.
    args.push("--build".into());
    args.extend(services.iter().cloned());
    args
}

/// Run `up -d --build [services...]`.
///
/// Output is streamed to the event bus as it arrives. Cancellation sends
/// SIGTERM to the child. A non-zero exit surfaces the captured stderr.
pub async fn run_up(
    options: &ComposeOptions,
    services: &[String],
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<()> {
    let args = up_args(options, services);
    tracing::info!(project = %options.project_name, services = ?services, "compose up");

    let mut child = Command::new("docker")
        .args(&args)
        .current_dir(&options.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::compose_exec("up", format!("failed to spawn docker: {e}")))?;

    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, COMPOSE_OUTPUT_SERVICE, StreamKind::Stdout, events.clone());
    }
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| forward_lines(stderr, COMPOSE_OUTPUT_SERVICE, StreamKind::Stderr, events.clone()));

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        () = cancel.cancelled() => None,
    };
    let status = match waited {
        Some(status) => status.map_err(|e| Error::compose_exec("up", e.to_string()))?,
        None => {
            terminate(&child);
            let _ = child.wait().await;
            return Err(Error::orchestrator("compose up cancelled"));
        }
    };

    if status.success() {
        Ok(())
    } else {
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default().join("\n"),
            None => String::new(),
        };
        Err(Error::compose_exec(
            "up",
            format!(
                "exited with {}: {}",
                status.code().unwrap_or(-1),
                stderr.trim()
            ),
        ))
    }
}

#[cfg(unix)]
fn terminate(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &tokio::process::Child) {}
