//! Compose project runner.
//!
//! Five operations over the local container-compose tool — `up`, `wait`,
//! `logs`, `ps`, `down` — all sharing one options bundle. Every invocation is
//! prefixed with `compose --progress plain --project-directory . -p <project>
//! -f <file>...` so the project scoping is identical across operations.
//!
//! The [`ComposeEngine`] trait is the orchestrator-facing seam: production
//! wiring is [`ComposeCli`], tests substitute their own implementation.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::events::EventSender;

pub mod down;
pub mod logs;
pub mod ps;
pub mod up;
pub mod wait;

pub use wait::WaitOptions;

/// Default interval between `ps` polls during a wait
pub const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default overall wait timeout
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Options shared by every compose invocation
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Compose project name (`lo1-<workspace>`)
    pub project_name: String,
    /// Compose files, passed as repeated `-f`
    pub file_args: Vec<PathBuf>,
    /// Working directory for the tool
    pub cwd: PathBuf,
}

impl ComposeOptions {
    /// Common argument prefix for every compose invocation
    #[must_use]
    pub fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "--progress".into(),
            "plain".into(),
            "--project-directory".into(),
            ".".into(),
            "-p".into(),
            self.project_name.clone(),
        ];
        for file in &self.file_args {
            args.push("-f".into());
            args.push(file.to_string_lossy().to_string());
        }
        args
    }
}

/// One container row from `ps --format json`
#[derive(Debug, Clone, Deserialize)]
pub struct PsEntry {
    /// Container name
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Compose service name
    #[serde(rename = "Service", default)]
    pub service: String,
    /// Container state (`running`, `exited`, ...)
    #[serde(rename = "State", default)]
    pub state: String,
    /// Health status; empty when the service has no healthcheck
    #[serde(rename = "Health", default)]
    pub health: String,
    /// Exit code, meaningful for exited containers
    #[serde(rename = "ExitCode", default)]
    pub exit_code: Option<i32>,
}

/// Kill switch for a running `logs -f` follower
#[derive(Debug)]
pub struct LogsHandle {
    child: Option<Child>,
}

impl LogsHandle {
    pub(crate) fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    /// A handle with no follower behind it (mock engines)
    #[must_use]
    pub fn noop() -> Self {
        Self { child: None }
    }

    /// Terminate the follower process
    pub async fn kill(mut self) {
        if let Some(child) = &mut self.child {
            let _ = child.kill().await;
        }
    }
}

/// Capability seam over the compose tool
#[async_trait]
pub trait ComposeEngine: Send + Sync {
    /// `up -d --build [services...]`, streaming output
    async fn up(
        &self,
        options: &ComposeOptions,
        services: &[String],
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Poll `ps` until every target service is ready (see [`wait`])
    async fn wait(
        &self,
        options: &ComposeOptions,
        wait: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Start a `logs -f` follower feeding the event bus
    async fn logs(&self, options: &ComposeOptions, events: &EventSender) -> Result<LogsHandle>;

    /// `ps -a --format json`, parsed
    async fn ps(&self, options: &ComposeOptions) -> Result<Vec<PsEntry>>;

    /// `down [-v --remove-orphans]`
    async fn down(&self, options: &ComposeOptions, clean: bool) -> Result<()>;
}

/// Production [`ComposeEngine`] shelling out to `docker compose`
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeCli;

#[async_trait]
impl ComposeEngine for ComposeCli {
    async fn up(
        &self,
        options: &ComposeOptions,
        services: &[String],
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<()> {
        up::run_up(options, services, events, cancel).await
    }

    async fn wait(
        &self,
        options: &ComposeOptions,
        wait: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        wait::run_wait(self, options, wait, cancel).await
    }

    async fn logs(&self, options: &ComposeOptions, events: &EventSender) -> Result<LogsHandle> {
        logs::run_logs(options, events).await
    }

    async fn ps(&self, options: &ComposeOptions) -> Result<Vec<PsEntry>> {
        ps::run_ps(options).await
    }

    async fn down(&self, options: &ComposeOptions, clean: bool) -> Result<()> {
        down::run_down(options, clean).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_args_shape() {
        let options = ComposeOptions {
            project_name: "lo1-shop".into(),
            file_args: vec![
                PathBuf::from(".lo1/compose.generated.yaml"),
                PathBuf::from("infra.yaml"),
            ],
            cwd: PathBuf::from("."),
        };
        assert_eq!(
            options.base_args(),
            vec![
                "compose",
                "--progress",
                "plain",
                "--project-directory",
                ".",
                "-p",
                "lo1-shop",
                "-f",
                ".lo1/compose.generated.yaml",
                "-f",
                "infra.yaml",
            ]
        );
    }
}
