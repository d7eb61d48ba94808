//! Error types for the lo1 orchestrator.
//!
//! A single crate-wide [`Error`] enum covers every failure kind the
//! orchestrator and its collaborators can produce. Variants carry structured
//! fields so the CLI can render them as one-line messages or JSON objects.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for lo1 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for all lo1 operations
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest read, parse, or validation failure
    #[error("Invalid workspace config at {path}: {message}")]
    Config {
        /// Field path breadcrumbs into the manifest (e.g. `services.api.command`)
        path: String,
        /// Description of the problem
        message: String,
    },

    /// A `dependsOn` entry names a service that does not exist
    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        /// Service declaring the dependency
        service: String,
        /// The missing dependency name
        dependency: String,
    },

    /// The dependency graph contains a cycle
    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    CycleDetected {
        /// One full cycle, first node repeated at the end
        path: Vec<String>,
    },

    /// `--services` named a service that does not exist
    #[error("Unknown service in filter: '{service}'")]
    Filter {
        /// The unknown name
        service: String,
    },

    /// Plugin resolution or binding failure
    #[error("Plugin error for '{plugin}': {message}")]
    Plugin {
        /// Plugin type name from the manifest
        plugin: String,
        /// Description of the problem
        message: String,
    },

    /// Compose document generation invariant violated
    #[error("Compose generation failed: {message}")]
    Compose {
        /// Description of the problem
        message: String,
    },

    /// Compose tool invocation failed
    #[error("Compose command failed: {command}: {message}")]
    ComposeExec {
        /// The compose subcommand that failed (e.g. `up`, `wait`)
        command: String,
        /// Captured stderr or failure description
        message: String,
    },

    /// Container lifecycle subprocess failure
    #[error("Container runner failed for '{service}': {message}")]
    ContainerRunner {
        /// The service whose container failed
        service: String,
        /// Description of the problem
        message: String,
    },

    /// Host process lifecycle failure
    #[error("Process runner failed for '{service}': {message}")]
    ProcessRunner {
        /// The service whose process failed
        service: String,
        /// Description of the problem
        message: String,
    },

    /// Readiness probe timed out or was cancelled
    #[error("Readiness probe failed for '{service}' at {url}")]
    ReadinessProbe {
        /// The probed service
        service: String,
        /// The probed URL
        url: String,
    },

    /// A lifecycle hook exited non-zero or failed to spawn
    #[error("Hook '{hook}' failed{}", hook_exit_suffix(.exit_code))]
    Hook {
        /// Hook name (e.g. `preStart`, `postInfrastructure`)
        hook: String,
        /// Exit code, None when the spawn itself errored
        exit_code: Option<i32>,
    },

    /// TLS trust helper failure
    #[error("TLS setup failed: {message}")]
    Tls {
        /// Description of the problem
        message: String,
    },

    /// Hosts file helper failure
    #[error("Hosts file update failed: {message}")]
    Hosts {
        /// Description of the problem
        message: String,
    },

    /// No valid runner could be determined for a service
    #[error("Cannot start service '{service}': {message}")]
    ServiceStart {
        /// The service that could not be started
        service: String,
        /// Why no runner applied
        message: String,
    },

    /// Orchestrator phase failure (abort, invalid binding)
    #[error("{message}")]
    Orchestrator {
        /// Description of the problem
        message: String,
    },

    /// Docker binary or daemon unavailable
    #[error("Docker is not available: {message}")]
    DockerUnavailable {
        /// What the preflight check found
        message: String,
    },

    /// State file read/write failure
    #[error("State file error at {path}: {message}")]
    State {
        /// Path to the state file
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// IO error occurred during operation
    #[error("IO error: {message}")]
    Io {
        /// Error message describing the IO failure
        message: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {message}")]
    Json {
        /// Error message describing the JSON failure
        message: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// YAML parsing or serialization error
    #[error("YAML error: {message}")]
    Yaml {
        /// Error message describing the YAML failure
        message: String,
        /// The underlying YAML error
        #[source]
        source: serde_yaml::Error,
    },
}

fn hook_exit_suffix(exit_code: &Option<i32>) -> String {
    exit_code
        .map(|code| format!(" with exit code {code}"))
        .unwrap_or_default()
}

impl Error {
    /// Create a new config error with field-path breadcrumbs
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new plugin error
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a new compose generation error
    pub fn compose(message: impl Into<String>) -> Self {
        Self::Compose {
            message: message.into(),
        }
    }

    /// Create a new compose invocation error
    pub fn compose_exec(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ComposeExec {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a new container runner error
    pub fn container_runner(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ContainerRunner {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a new process runner error
    pub fn process_runner(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProcessRunner {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a new readiness probe error
    pub fn readiness_probe(service: impl Into<String>, url: impl Into<String>) -> Self {
        Self::ReadinessProbe {
            service: service.into(),
            url: url.into(),
        }
    }

    /// Create a new hook error
    pub fn hook(hook: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Hook {
            hook: hook.into(),
            exit_code,
        }
    }

    /// Create a new TLS error
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Create a new hosts file error
    pub fn hosts(message: impl Into<String>) -> Self {
        Self::Hosts {
            message: message.into(),
        }
    }

    /// Create a new service start error
    pub fn service_start(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServiceStart {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a new orchestrator error
    pub fn orchestrator(message: impl Into<String>) -> Self {
        Self::Orchestrator {
            message: message.into(),
        }
    }

    /// Create a new state file error
    pub fn state(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::State {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Get the error kind name for `--json` output and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "ConfigError",
            Self::UnknownDependency { .. } | Self::CycleDetected { .. } => "DagError",
            Self::Filter { .. } => "FilterError",
            Self::Plugin { .. } => "PluginError",
            Self::Compose { .. } => "ComposeError",
            Self::ComposeExec { .. } => "ComposeExecError",
            Self::ContainerRunner { .. } => "ContainerRunnerError",
            Self::ProcessRunner { .. } => "ProcessRunnerError",
            Self::ReadinessProbe { .. } => "ReadinessProbeError",
            Self::Hook { .. } => "HookError",
            Self::Tls { .. } => "TlsError",
            Self::Hosts { .. } => "HostsError",
            Self::ServiceStart { .. } => "ServiceStartError",
            Self::Orchestrator { .. } => "OrchestratorError",
            Self::DockerUnavailable { .. } => "DockerUnavailableError",
            Self::State { .. } => "StateError",
            Self::Io { .. } => "IoError",
            Self::Json { .. } | Self::Yaml { .. } => "SerializationError",
        }
    }

    /// Render the error as a `--json` object
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        let details = match self {
            Self::Config { path, .. } => serde_json::json!({ "path": path }),
            Self::UnknownDependency {
                service,
                dependency,
            } => serde_json::json!({ "service": service, "dependency": dependency }),
            Self::CycleDetected { path } => serde_json::json!({ "cycle": path }),
            Self::Filter { service } => serde_json::json!({ "service": service }),
            Self::ReadinessProbe { service, url } => {
                serde_json::json!({ "service": service, "url": url })
            }
            Self::Hook { hook, exit_code } => {
                serde_json::json!({ "hook": hook, "exitCode": exit_code })
            }
            _ => serde_json::Value::Null,
        };
        if let (Some(object), serde_json::Value::Object(details)) =
            (object.as_object_mut(), details)
        {
            object.extend(details);
        }
        object
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
            source: err,
        }
    }
}
