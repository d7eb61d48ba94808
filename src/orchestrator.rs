//! Workspace orchestration: the phase sequence behind `up` and `down`.
//!
//! The orchestrator drives everything through a small bundle of injected
//! capabilities ([`OrchestratorDeps`]): the compose engine, the privileged
//! hosts writer, the TLS trust helper, and the plugin registry. Production
//! wiring is the default; tests substitute mocks and run the full phase
//! sequence without a container daemon.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::compose::{ComposeCli, ComposeEngine, ComposeOptions, LogsHandle};
use crate::config::{ServiceMode, WorkspaceConfig};
use crate::hosts::{HostsWriter, SystemHostsWriter};
use crate::plugin::PluginRegistry;
use crate::runner::ServiceHandle;
use crate::tls::{CaddyTlsTrust, TlsTrust};

pub mod start;
pub mod stop;

pub use start::start_workspace;
pub use stop::{stop_workspace, InMemoryRun};

/// Default manifest file name
pub const MANIFEST_FILE: &str = "lo1.yaml";

/// Injected collaborators for one orchestrator run
#[derive(Clone)]
pub struct OrchestratorDeps {
    /// Compose tool seam
    pub compose: Arc<dyn ComposeEngine>,
    /// Privileged hosts-file writer
    pub hosts: Arc<dyn HostsWriter>,
    /// TLS trust helper
    pub tls: Arc<dyn TlsTrust>,
    /// Registered plugins
    pub plugins: PluginRegistry,
}

impl Default for OrchestratorDeps {
    fn default() -> Self {
        Self {
            compose: Arc::new(ComposeCli),
            hosts: Arc::new(SystemHostsWriter::new()),
            tls: Arc::new(CaddyTlsTrust::new()),
            plugins: PluginRegistry::new(),
        }
    }
}

impl std::fmt::Debug for OrchestratorDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorDeps")
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

/// Options for [`start_workspace`]
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Workspace root directory
    pub workspace_dir: PathBuf,
    /// Manifest path; `<workspace>/lo1.yaml` when `None`
    pub manifest_path: Option<PathBuf>,
    /// Requested service subset; everything when empty
    pub service_filter: Vec<String>,
    /// Force every non-skip service to this mode
    pub mode_override: Option<ServiceMode>,
    /// Readiness probe budget override (tests, impatient users)
    pub probe_timeout: Option<Duration>,
}

impl StartOptions {
    /// Start everything in the given workspace
    #[must_use]
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            manifest_path: None,
            service_filter: Vec::new(),
            mode_override: None,
            probe_timeout: None,
        }
    }

    /// Resolved manifest path
    #[must_use]
    pub fn manifest(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(|| self.workspace_dir.join(MANIFEST_FILE))
    }
}

/// Options for [`stop_workspace`]
#[derive(Debug, Clone)]
pub struct StopOptions {
    /// Workspace root directory
    pub workspace_dir: PathBuf,
    /// Also remove volumes and orphan containers
    pub clean: bool,
}

/// A successfully started workspace, as handed back to the CLI
pub struct StartedWorkspace {
    /// The loaded (possibly filtered / mode-overridden) config
    pub config: Arc<WorkspaceConfig>,
    /// One handle per started service, in start order
    pub handles: Vec<ServiceHandle>,
    /// Compose options for the running project
    pub compose_options: ComposeOptions,
    /// Log follower for compose-managed services, when one was started
    pub logs_handle: Option<LogsHandle>,
}

impl std::fmt::Debug for StartedWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartedWorkspace")
            .field("workspace", &self.config.name)
            .field("handles", &self.handles.len())
            .finish_non_exhaustive()
    }
}
