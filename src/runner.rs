//! Service supervision handles.
//!
//! Whatever mechanism runs a service (host process, single container, or the
//! compose project), the orchestrator holds one [`ServiceHandle`] per started
//! service and treats it as an opaque stop token. Supervisory state lives in
//! the handle itself; stopping is `stop(&self, timeout)`, no closure capture.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{Error, Result};

pub mod container;
pub mod process;

pub use container::{start_container, ContainerHandle, ContainerOptions, ContainerRunConfig};
pub use process::{start_process, ProcessHandle, ProcessOptions};

/// Default grace period before a host process is force-killed
pub const DEFAULT_PROCESS_STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Default grace period before a container is force-stopped
pub const DEFAULT_CONTAINER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// The mechanism supervising a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// Host process started from a shell command
    Process,
    /// Single container started with `docker run`
    Container,
    /// Managed as part of the compose project
    Compose,
}

impl std::fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Container => write!(f, "container"),
            Self::Compose => write!(f, "compose"),
        }
    }
}

/// Opaque stop token for one running service
#[derive(Debug)]
pub struct ServiceHandle {
    /// The supervised service
    pub service_name: String,
    /// How the service is supervised
    pub kind: RunnerKind,
    supervisor: Supervisor,
}

#[derive(Debug)]
enum Supervisor {
    Process(ProcessHandle),
    Container(ContainerHandle),
    /// Compose-managed: lifecycle belongs to `compose down`
    Passive,
    /// Hydrated from a state file in a later CLI invocation
    Recovered(Recovered),
}

/// Minimal supervisory state recoverable from `state.json`
#[derive(Debug, Clone)]
pub struct Recovered {
    /// Original runner kind
    pub kind: RunnerKind,
    /// Recorded pid for process runners
    pub pid: Option<u32>,
    /// Recorded container name or id for container runners
    pub container_id: Option<String>,
}

impl ServiceHandle {
    /// Wrap a process runner handle
    #[must_use]
    pub fn process(service_name: impl Into<String>, handle: ProcessHandle) -> Self {
        Self {
            service_name: service_name.into(),
            kind: RunnerKind::Process,
            supervisor: Supervisor::Process(handle),
        }
    }

    /// Wrap a container runner handle
    #[must_use]
    pub fn container(service_name: impl Into<String>, handle: ContainerHandle) -> Self {
        Self {
            service_name: service_name.into(),
            kind: RunnerKind::Container,
            supervisor: Supervisor::Container(handle),
        }
    }

    /// A passive handle for a compose-managed service
    #[must_use]
    pub fn passive(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            kind: RunnerKind::Compose,
            supervisor: Supervisor::Passive,
        }
    }

    /// Rebuild a handle from persisted state
    #[must_use]
    pub fn recovered(service_name: impl Into<String>, recovered: Recovered) -> Self {
        Self {
            service_name: service_name.into(),
            kind: recovered.kind,
            supervisor: Supervisor::Recovered(recovered),
        }
    }

    /// Pid of the supervised process, when one exists
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match &self.supervisor {
            Supervisor::Process(handle) => Some(handle.pid()),
            Supervisor::Recovered(recovered) => recovered.pid,
            _ => None,
        }
    }

    /// Container id, when one exists
    #[must_use]
    pub fn container_id(&self) -> Option<&str> {
        match &self.supervisor {
            Supervisor::Container(handle) => Some(handle.container_id()),
            Supervisor::Recovered(recovered) => recovered.container_id.as_deref(),
            _ => None,
        }
    }

    /// Whether the supervised service is still believed to be running
    #[must_use]
    pub fn is_running(&self) -> bool {
        match &self.supervisor {
            Supervisor::Process(handle) => handle.is_running(),
            Supervisor::Container(handle) => handle.is_running(),
            Supervisor::Passive => false,
            Supervisor::Recovered(_) => true,
        }
    }

    /// Stop the service: graceful first, forced after `timeout`.
    ///
    /// Passive (compose) handles are a no-op; `compose down` owns them.
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.supervisor {
            Supervisor::Process(handle) => {
                handle.stop(timeout).await?;
                Ok(())
            }
            Supervisor::Container(handle) => handle.stop(timeout).await,
            Supervisor::Passive => Ok(()),
            Supervisor::Recovered(recovered) => {
                stop_recovered(&self.service_name, recovered, timeout).await
            }
        }
    }
}

/// Stop a service known only from persisted state. Best effort by design:
/// the original supervisor is gone, so "already dead" is success.
async fn stop_recovered(
    service_name: &str,
    recovered: &Recovered,
    timeout: Option<Duration>,
) -> Result<()> {
    match recovered.kind {
        RunnerKind::Process => {
            if let Some(pid) = recovered.pid {
                process::terminate_pid(pid, timeout.unwrap_or(DEFAULT_PROCESS_STOP_TIMEOUT)).await;
            }
            Ok(())
        }
        RunnerKind::Container => {
            if let Some(id) = &recovered.container_id {
                container::stop_and_remove(
                    id,
                    timeout.unwrap_or(DEFAULT_CONTAINER_STOP_TIMEOUT),
                )
                .await;
            }
            Ok(())
        }
        RunnerKind::Compose => {
            tracing::debug!(service = service_name, "compose-managed, left to compose down");
            Ok(())
        }
    }
}

/// Build a command that runs `command` through the platform shell.
pub(crate) fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/C").arg(command);
        cmd
    }
}

/// Run `docker` with the given args, capturing output. Used by the container
/// runner and the recovered-handle teardown path.
pub(crate) async fn docker_output(args: &[String]) -> Result<std::process::Output> {
    Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| Error::container_runner("docker", format!("failed to run docker: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passive_handle_is_inert() {
        let handle = ServiceHandle::passive("web");
        assert_eq!(handle.kind, RunnerKind::Compose);
        assert!(!handle.is_running());
        assert!(handle.pid().is_none());
        assert!(handle.container_id().is_none());
        handle.stop(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_recovered_compose_handle_noop() {
        let handle = ServiceHandle::recovered(
            "web",
            Recovered {
                kind: RunnerKind::Compose,
                pid: None,
                container_id: None,
            },
        );
        handle.stop(None).await.unwrap();
    }

    #[test]
    fn test_runner_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&RunnerKind::Process).unwrap(),
            "\"process\""
        );
        assert_eq!(
            serde_json::from_str::<RunnerKind>("\"compose\"").unwrap(),
            RunnerKind::Compose
        );
    }
}
