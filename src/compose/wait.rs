//! Readiness wait: poll `ps` until every target service is ready.
//!
//! Ordinary services are ready when running (and healthy, if a healthcheck
//! exists) or when they exited cleanly. Init tasks are ready only once they
//! exited with code 0; a running init task is still pending. An unhealthy
//! container or a non-zero exit fails the wait immediately.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::compose::{
    ComposeEngine, ComposeOptions, PsEntry, DEFAULT_WAIT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT,
};
use crate::error::{Error, Result};

/// Parameters for one readiness wait
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Services that must become ready
    pub services: Vec<String>,
    /// Subset treated as init tasks (ready only once exited 0)
    pub wait_for_exit: Vec<String>,
    /// Interval between `ps` polls
    pub poll_interval: Duration,
    /// Overall deadline
    pub timeout: Duration,
}

impl WaitOptions {
    /// Wait for the given services with default polling and timeout
    #[must_use]
    pub fn for_services(services: Vec<String>, wait_for_exit: Vec<String>) -> Self {
        Self {
            services,
            wait_for_exit,
            poll_interval: DEFAULT_WAIT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Outcome of evaluating one `ps` snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessEval {
    /// Every target service is ready
    Ready,
    /// These services are not ready yet
    Pending(Vec<String>),
    /// A service failed terminally
    Failed(String),
}

/// Evaluate one `ps` snapshot against the wait targets.
///
/// Pure so the polling policy and the readiness table test separately.
#[must_use]
pub fn evaluate_readiness(
    entries: &[PsEntry],
    services: &[String],
    wait_for_exit: &[String],
) -> ReadinessEval {
    let mut pending = Vec::new();
    for service in services {
        let rows: Vec<&PsEntry> = entries.iter().filter(|e| &e.service == service).collect();
        if rows.is_empty() {
            pending.push(service.clone());
            continue;
        }
        let is_init = wait_for_exit.contains(service);
        for row in rows {
            match row_status(row, is_init) {
                RowStatus::Ready => {}
                RowStatus::Pending => {
                    pending.push(service.clone());
                    break;
                }
                RowStatus::Failed(reason) => return ReadinessEval::Failed(reason),
            }
        }
    }
    if pending.is_empty() {
        ReadinessEval::Ready
    } else {
        ReadinessEval::Pending(pending)
    }
}

enum RowStatus {
    Ready,
    Pending,
    Failed(String),
}

fn row_status(row: &PsEntry, is_init: bool) -> RowStatus {
    if row.health == "unhealthy" {
        return RowStatus::Failed(format!("service '{}' is unhealthy", row.service));
    }
    match row.state.as_str() {
        "exited" => match row.exit_code {
            Some(0) => RowStatus::Ready,
            Some(code) => RowStatus::Failed(format!(
                "service '{}' exited with code {code}",
                row.service
            )),
            // An exited row without a code is still settling.
            None => RowStatus::Pending,
        },
        "running" if is_init => RowStatus::Pending,
        "running" => {
            if row.health.is_empty() || row.health == "healthy" {
                RowStatus::Ready
            } else {
                // starting, or some intermediate health state
                RowStatus::Pending
            }
        }
        // created, restarting, paused, missing, ...
        _ => RowStatus::Pending,
    }
}

/// Poll `ps` until the targets are ready, the deadline passes, or the token
/// cancels.
pub async fn run_wait<E: ComposeEngine + ?Sized>(
    engine: &E,
    options: &ComposeOptions,
    wait: WaitOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    if wait.services.is_empty() {
        return Ok(());
    }
    tracing::info!(
        project = %options.project_name,
        services = ?wait.services,
        init_tasks = ?wait.wait_for_exit,
        "waiting for compose services"
    );

    let deadline = tokio::time::Instant::now() + wait.timeout;
    let mut last_pending = wait.services.clone();
    loop {
        if cancel.is_cancelled() {
            return Err(Error::orchestrator("compose wait cancelled"));
        }
        let entries = engine.ps(options).await?;
        match evaluate_readiness(&entries, &wait.services, &wait.wait_for_exit) {
            ReadinessEval::Ready => return Ok(()),
            ReadinessEval::Failed(reason) => return Err(Error::compose_exec("wait", reason)),
            ReadinessEval::Pending(pending) => {
                tracing::debug!(pending = ?pending, "services not ready yet");
                last_pending = pending;
            }
        }
        if tokio::time::Instant::now() + wait.poll_interval > deadline {
            return Err(Error::compose_exec(
                "wait",
                format!(
                    "timed out after {:?} waiting for services: {}",
                    wait.timeout,
                    last_pending.join(", ")
                ),
            ));
        }
        tokio::time::sleep(wait.poll_interval).await;
    }
}
