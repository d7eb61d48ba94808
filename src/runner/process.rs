//! Host process runner.
//!
//! Services in `dev` mode run as shell commands in their own process group.
//! Output is streamed line by line into the event bus. Stopping is graceful
//! first (SIGTERM to the group), forced after the timeout (SIGKILL).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::events::{EventSender, StreamKind};
use crate::runner::{shell_command, DEFAULT_PROCESS_STOP_TIMEOUT};
use crate::stream::forward_lines;

/// What to run and where
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Service the process belongs to
    pub service_name: String,
    /// Shell command line
    pub command: String,
    /// Working directory
    pub cwd: PathBuf,
    /// Extra environment; the ambient environment is inherited underneath
    pub env: BTreeMap<String, String>,
}

/// Supervisory state for one running host process
#[derive(Debug)]
pub struct ProcessHandle {
    service_name: String,
    pid: u32,
    running: Arc<AtomicBool>,
    exit_rx: watch::Receiver<Option<Option<i32>>>,
}

/// Spawn a service process and start streaming its output.
pub async fn start_process(options: ProcessOptions, events: &EventSender) -> Result<ProcessHandle> {
    let ProcessOptions {
        service_name,
        command,
        cwd,
        env,
    } = options;

    let mut cmd = shell_command(&command);
    // No kill-on-drop: a detached CLI exit must leave services running, and
    // crash leftovers are reclaimed through the state file.
    cmd.current_dir(&cwd)
        .envs(&env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| {
        Error::process_runner(&service_name, format!("failed to spawn '{command}': {e}"))
    })?;
    let pid = child.id().ok_or_else(|| {
        Error::process_runner(&service_name, "process exited before a pid was available")
    })?;

    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, &service_name, StreamKind::Stdout, events.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, &service_name, StreamKind::Stderr, events.clone());
    }

    let running = Arc::new(AtomicBool::new(true));
    let (exit_tx, exit_rx) = watch::channel(None);

    let waiter_running = Arc::clone(&running);
    let waiter_service = service_name.clone();
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => status.code(),
            Err(_) => None,
        };
        tracing::debug!(service = %waiter_service, pid, code = ?code, "process exited");
        waiter_running.store(false, Ordering::SeqCst);
        let _ = exit_tx.send(Some(code));
    });

    tracing::info!(service = %service_name, pid, "process started");
    Ok(ProcessHandle {
        service_name,
        pid,
        running,
        exit_rx,
    })
}

impl ProcessHandle {
    /// Pid of the running process
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the process is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait for the process to exit on its own.
    ///
    /// Returns the exit code, None when it was killed by a signal.
    pub async fn wait(&self) -> Option<i32> {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(code) = *rx.borrow() {
                return code;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Stop the process: SIGTERM to the group, SIGKILL after `timeout`.
    ///
    /// Resolves with the exit code, None when the spawn path never produced
    /// one (signal death or wait error).
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<Option<i32>> {
        let timeout = timeout.unwrap_or(DEFAULT_PROCESS_STOP_TIMEOUT);
        if self.is_running() {
            tracing::debug!(service = %self.service_name, pid = self.pid, "sending SIGTERM");
            signal_group(self.pid, Signal::Term);
            if tokio::time::timeout(timeout, self.wait()).await.is_err() {
                tracing::warn!(
                    service = %self.service_name,
                    pid = self.pid,
                    "no exit within {timeout:?}, sending SIGKILL"
                );
                signal_group(self.pid, Signal::Kill);
                // The kill is not ignorable; the wait below is bounded by it.
                let _ = tokio::time::timeout(Duration::from_secs(5), self.wait()).await;
            }
        }
        let exit = *self.exit_rx.borrow();
        Ok(exit.flatten())
    }
}

enum Signal {
    Term,
    Kill,
}

/// Deliver a signal to the process group rooted at `pid`.
#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal) {
    let signo = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // Negative pid addresses the whole group; fall back to the single pid in
    // case the group is already gone.
    unsafe {
        if libc::kill(-(pid as i32), signo) != 0 {
            libc::kill(pid as i32, signo);
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: Signal) {
    // No group signalling; the kill channel forces termination instead.
}

/// Terminate a process known only by pid (recovered from a state file):
/// SIGTERM, wait out the grace period, then SIGKILL if it still exists.
pub(crate) async fn terminate_pid(pid: u32, timeout: Duration) {
    #[cfg(unix)]
    {
        signal_group(pid, Signal::Term);
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            // Signal 0 only probes for existence.
            if unsafe { libc::kill(pid as i32, 0) } != 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        signal_group(pid, Signal::Kill);
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, timeout);
    }
}
