//! Workspace manifest loading and validation.
//!
//! The `lo1.yaml` manifest is parsed into an immutable [`WorkspaceConfig`].
//! Structural validation runs immediately after deserialization and reports
//! problems with field-path breadcrumbs (`services.api.command`). Dependency
//! reference and cycle checks are the DAG builder's job, not this module's.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Manifest schema version this build understands
pub const SCHEMA_VERSION: &str = "1";

/// Service types handled by the built-in runners
pub const BUILTIN_TYPES: &[&str] = &["service", "app"];

/// How a service is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Host process started from `command`
    #[default]
    Dev,
    /// Managed by the compose project (or a plugin container)
    Container,
    /// Declared but never started
    Skip,
}

impl std::fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dev => write!(f, "dev"),
            Self::Container => write!(f, "container"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Reverse-proxy exposure for a single service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceProxyConfig {
    /// Domain override; defaults to `<service>.<workspace>.<tld>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Route only this path prefix through the proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

/// Per-service lifecycle hooks
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceHooks {
    /// Runs before the runner is spawned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_start: Option<String>,
    /// Runs after the readiness probe succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_start: Option<String>,
    /// Runs before the service is stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_stop: Option<String>,
}

/// One service entry in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceConfig {
    /// Service type: a builtin (`service`, `app`) or a plugin type name
    #[serde(rename = "type")]
    pub service_type: String,
    /// Source directory, relative to the workspace
    pub path: String,
    /// Container-internal port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Host-visible port; defaults to `port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    /// How to run the service
    #[serde(default)]
    pub mode: ServiceMode,
    /// Shell command for `dev` mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Image for `container` mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,
    /// Per-service compose file for `container` mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<PathBuf>,
    /// Extra environment for the service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Reverse-proxy exposure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ServiceProxyConfig>,
    /// Lifecycle hooks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<ServiceHooks>,
    /// Services that must be ready before this one starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Run-to-completion service: ready only once exited 0
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub init_task: bool,
    /// URL polled until it answers 2xx before dependents may start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<String>,
}

impl ServiceConfig {
    /// Host-visible port, defaulting to the internal port
    #[must_use]
    pub fn effective_host_port(&self) -> Option<u16> {
        self.host_port.or(self.port)
    }

    /// Whether the type is handled by the built-in runners
    #[must_use]
    pub fn is_builtin_type(&self) -> bool {
        BUILTIN_TYPES.contains(&self.service_type.as_str())
    }
}

/// TLS section of the proxy config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProxyTlsConfig {
    /// Serve HTTPS through the proxy
    #[serde(default)]
    pub enabled: bool,
    /// Host port published for 443
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Workspace reverse-proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProxyConfig {
    /// Run the proxy container at all
    #[serde(default)]
    pub enabled: bool,
    /// Host port published for 80
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Top-level domain for generated service domains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tld: Option<String>,
    /// HTTPS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ProxyTlsConfig>,
}

/// Workspace-level lifecycle hooks
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkspaceHooks {
    /// Runs after infrastructure containers are ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_infrastructure: Option<String>,
    /// Runs after every service layer has started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_setup: Option<String>,
    /// Runs before teardown begins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_stop: Option<String>,
}

/// Extra compose file pulled into the project alongside generated services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraCompose {
    /// Bare path to a compose file
    Path(PathBuf),
    /// Path plus the services that must run to completion
    Detailed {
        /// Path to the compose file
        file: PathBuf,
        /// Services treated as init tasks during readiness waits
        #[serde(default, rename = "initTaskServices")]
        init_task_services: Vec<String>,
    },
}

impl ExtraCompose {
    /// Path to the compose file
    #[must_use]
    pub fn file(&self) -> &Path {
        match self {
            Self::Path(path) => path,
            Self::Detailed { file, .. } => file,
        }
    }

    /// Services treated as init tasks
    #[must_use]
    pub fn init_task_services(&self) -> &[String] {
        match self {
            Self::Path(_) => &[],
            Self::Detailed {
                init_task_services, ..
            } => init_task_services,
        }
    }
}

/// A repository cloned by `lo1 init`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Git URL
    pub url: String,
    /// Checkout directory, relative to the workspace
    pub path: String,
    /// Branch to clone; remote default when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// The whole `lo1.yaml` manifest, immutable after [`WorkspaceConfig::load`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Schema version literal, must be `"1"`
    pub version: String,
    /// Workspace name; scopes project, network, and container names
    pub name: String,
    /// Plugin type name to specifier
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, String>,
    /// Repositories for `lo1 init`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryConfig>,
    /// Reverse-proxy settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    /// Extra compose file merged into the project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_compose: Option<ExtraCompose>,
    /// Workspace-level hooks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<WorkspaceHooks>,
    /// Services keyed by name
    pub services: BTreeMap<String, ServiceConfig>,
}

impl WorkspaceConfig {
    /// Read and validate a manifest file
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::config(path.display().to_string(), e.to_string()))?;
        Self::parse(&raw)
    }

    /// Parse and validate manifest text
    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|e| Error::config("<manifest>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation with field-path breadcrumbs
    pub fn validate(&self) -> Result<()> {
        if self.version != SCHEMA_VERSION {
            return Err(Error::config(
                "version",
                format!("expected \"{SCHEMA_VERSION}\", got \"{}\"", self.version),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(Error::config("name", "workspace name must not be empty"));
        }
        for (name, service) in &self.services {
            validate_service(name, service)?;
        }
        if let Some(proxy) = &self.proxy {
            if proxy.port == Some(0) {
                return Err(Error::config("proxy.port", "port must be positive"));
            }
            if let Some(tls) = &proxy.tls {
                if tls.port == Some(0) {
                    return Err(Error::config("proxy.tls.port", "port must be positive"));
                }
            }
        }
        Ok(())
    }

    /// Compose project name: `lo1-<workspace>`
    #[must_use]
    pub fn project_name(&self) -> String {
        format!("lo1-{}", self.name)
    }

    /// Workspace container network name
    #[must_use]
    pub fn network_name(&self) -> String {
        format!("lo1-{}-network", self.name)
    }

    /// Proxy compose service name
    #[must_use]
    pub fn proxy_service_name(&self) -> String {
        format!("lo1-{}-proxy", self.name)
    }

    /// Container name for a single-container service
    #[must_use]
    pub fn container_name(&self, service: &str) -> String {
        format!("lo1-{}-{}", self.name, service)
    }

    /// Top-level domain for generated proxy domains
    #[must_use]
    pub fn tld(&self) -> &str {
        self.proxy
            .as_ref()
            .and_then(|p| p.tld.as_deref())
            .unwrap_or("local")
    }

    /// Whether the proxy serves HTTPS
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.proxy
            .as_ref()
            .and_then(|p| p.tls.as_ref())
            .is_some_and(|t| t.enabled)
    }

    /// Force every non-skip service to the given mode
    pub fn apply_mode_override(&mut self, mode: ServiceMode) {
        for service in self.services.values_mut() {
            if service.mode != ServiceMode::Skip {
                service.mode = mode;
            }
        }
    }

    /// Drop every service outside the given set
    pub fn retain_services(&mut self, keep: &std::collections::BTreeSet<String>) {
        self.services.retain(|name, _| keep.contains(name));
    }
}

fn validate_service(name: &str, service: &ServiceConfig) -> Result<()> {
    let at = |field: &str| format!("services.{name}.{field}");
    if service.port == Some(0) {
        return Err(Error::config(at("port"), "port must be positive"));
    }
    if service.host_port == Some(0) {
        return Err(Error::config(at("hostPort"), "hostPort must be positive"));
    }
    // Plugin types may supply a container configuration at start time, so
    // runner determinability is only checkable here for builtin types.
    if service.is_builtin_type() {
        match service.mode {
            ServiceMode::Dev => {
                if service.command.is_none() {
                    return Err(Error::config(
                        at("command"),
                        "a dev-mode service needs a command",
                    ));
                }
            }
            ServiceMode::Container => {
                if service.container_image.is_none() && service.compose.is_none() {
                    return Err(Error::config(
                        at("containerImage"),
                        "a container-mode service needs a containerImage or a compose file",
                    ));
                }
            }
            ServiceMode::Skip => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
version: "1"
name: shop
services:
  api:
    type: service
    path: ./api
    command: npm run dev
"#;

    #[test]
    fn test_parse_minimal() {
        let config = WorkspaceConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.name, "shop");
        let api = &config.services["api"];
        assert_eq!(api.mode, ServiceMode::Dev);
        assert!(api.depends_on.is_empty());
        assert!(!api.init_task);
        assert_eq!(config.project_name(), "lo1-shop");
        assert_eq!(config.network_name(), "lo1-shop-network");
        assert_eq!(config.container_name("api"), "lo1-shop-api");
    }

    #[test]
    fn test_rejects_wrong_version() {
        let raw = MINIMAL.replace("\"1\"", "\"2\"");
        let err = WorkspaceConfig::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_dev_mode_requires_command() {
        let raw = r#"
version: "1"
name: shop
services:
  api:
    type: service
    path: ./api
"#;
        let err = WorkspaceConfig::parse(raw).unwrap_err();
        assert!(err.to_string().contains("services.api.command"));
    }

    #[test]
    fn test_container_mode_requires_image_or_compose() {
        let raw = r#"
version: "1"
name: shop
services:
  db:
    type: service
    path: ./db
    mode: container
"#;
        let err = WorkspaceConfig::parse(raw).unwrap_err();
        assert!(err.to_string().contains("services.db.containerImage"));
    }

    #[test]
    fn test_plugin_type_defers_runner_check() {
        let raw = r#"
version: "1"
name: shop
plugins:
  redis: builtin:redis
services:
  cache:
    type: redis
    path: ./cache
"#;
        let config = WorkspaceConfig::parse(raw).unwrap();
        assert!(!config.services["cache"].is_builtin_type());
    }

    #[test]
    fn test_host_port_defaults_to_port() {
        let raw = r#"
version: "1"
name: shop
services:
  api:
    type: service
    path: ./api
    command: run
    port: 3000
  web:
    type: app
    path: ./web
    command: run
    port: 8080
    hostPort: 18080
"#;
        let config = WorkspaceConfig::parse(raw).unwrap();
        assert_eq!(config.services["api"].effective_host_port(), Some(3000));
        assert_eq!(config.services["web"].effective_host_port(), Some(18080));
    }

    #[test]
    fn test_extra_compose_both_forms() {
        let bare = r#"
version: "1"
name: shop
extraCompose: ./infra.yaml
services: {}
"#;
        let config = WorkspaceConfig::parse(bare).unwrap();
        let extra = config.extra_compose.unwrap();
        assert_eq!(extra.file(), Path::new("./infra.yaml"));
        assert!(extra.init_task_services().is_empty());

        let detailed = r#"
version: "1"
name: shop
extraCompose:
  file: ./infra.yaml
  initTaskServices: [migrator]
services: {}
"#;
        let config = WorkspaceConfig::parse(detailed).unwrap();
        let extra = config.extra_compose.unwrap();
        assert_eq!(extra.file(), Path::new("./infra.yaml"));
        assert_eq!(extra.init_task_services(), ["migrator"]);
    }

    #[test]
    fn test_mode_override_skips_skip() {
        let raw = r#"
version: "1"
name: shop
services:
  api:
    type: service
    path: ./api
    command: run
  legacy:
    type: service
    path: ./legacy
    mode: skip
"#;
        let mut config = WorkspaceConfig::parse(raw).unwrap();
        config.apply_mode_override(ServiceMode::Container);
        assert_eq!(config.services["api"].mode, ServiceMode::Container);
        assert_eq!(config.services["legacy"].mode, ServiceMode::Skip);
    }

    #[test]
    fn test_tld_and_tls_defaults() {
        let config = WorkspaceConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.tld(), "local");
        assert!(!config.tls_enabled());

        let raw = r#"
version: "1"
name: shop
proxy:
  enabled: true
  tld: dev.test
  tls:
    enabled: true
services: {}
"#;
        let config = WorkspaceConfig::parse(raw).unwrap();
        assert_eq!(config.tld(), "dev.test");
        assert!(config.tls_enabled());
    }
}
