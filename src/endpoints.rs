//! Service endpoint derivation and discovery environment variables.
//!
//! Every service with a port and a non-skip mode gets three URLs: the
//! container-internal one (`http://<name>:<port>`), the host-visible one
//! (`http://localhost:<hostPort>`), and the proxy one
//! (`<scheme>://<name>.<workspace>.<tld>`). Consumers discover each other
//! through `LO1_SERVICE_*` environment variables whose values depend on
//! whether the consumer runs on the host or inside the container network.

use std::collections::BTreeMap;

use crate::config::{ServiceConfig, ServiceMode, WorkspaceConfig};

/// Derived endpoints for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Service name
    pub name: String,
    /// Container-internal port
    pub port: u16,
    /// Host-visible port
    pub host_port: u16,
    /// URL reachable from inside the container network
    pub internal_url: String,
    /// URL reachable from the host
    pub external_url: String,
    /// URL through the reverse proxy
    pub proxy_url: String,
    /// The service's run mode
    pub mode: ServiceMode,
}

/// All registered endpoints for a workspace
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    /// Endpoints keyed by service name
    pub endpoints: BTreeMap<String, ServiceEndpoint>,
}

/// Where env var values will be consumed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerMode {
    /// A host process: uses `localhost:<hostPort>`
    Host,
    /// A container on the workspace network: uses `<name>:<port>`
    Container,
}

/// Derive the endpoint registry from the manifest.
///
/// Only services with a port and a mode other than `skip` are registered.
#[must_use]
pub fn build_endpoint_registry(config: &WorkspaceConfig) -> EndpointRegistry {
    let scheme = if config.tls_enabled() { "https" } else { "http" };
    let mut endpoints = BTreeMap::new();
    for (name, service) in &config.services {
        if service.mode == ServiceMode::Skip {
            continue;
        }
        let Some(port) = service.port else { continue };
        let host_port = service.effective_host_port().unwrap_or(port);
        endpoints.insert(
            name.clone(),
            ServiceEndpoint {
                name: name.clone(),
                port,
                host_port,
                internal_url: format!("http://{name}:{port}"),
                external_url: format!("http://localhost:{host_port}"),
                proxy_url: format!("{scheme}://{name}.{}.{}", config.name, config.tld()),
                mode: service.mode,
            },
        );
    }
    EndpointRegistry { endpoints }
}

/// Discovery env vars for every registered service.
///
/// For each service `S`: `LO1_SERVICE_<UPPER_SNAKE(S)>_URL`, `_PORT`, and
/// `_PROXY_URL`. URL and PORT resolve per the consumer mode.
#[must_use]
pub fn build_discovery_env_vars(
    registry: &EndpointRegistry,
    consumer: ConsumerMode,
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for endpoint in registry.endpoints.values() {
        let key = upper_snake(&endpoint.name);
        let (url, port) = match consumer {
            ConsumerMode::Container => (endpoint.internal_url.clone(), endpoint.port),
            ConsumerMode::Host => (endpoint.external_url.clone(), endpoint.host_port),
        };
        vars.insert(format!("LO1_SERVICE_{key}_URL"), url);
        vars.insert(format!("LO1_SERVICE_{key}_PORT"), port.to_string());
        vars.insert(
            format!("LO1_SERVICE_{key}_PROXY_URL"),
            endpoint.proxy_url.clone(),
        );
    }
    vars
}

/// Assemble the full environment for one service.
///
/// Precedence, lowest to highest: discovery vars, plugin vars (rewritten for
/// host consumers), the service's own `env`, then the reserved
/// `LO1_SERVICE_NAME` / `LO1_WORKSPACE_NAME` pair.
#[must_use]
pub fn build_service_env(
    service_name: &str,
    service: &ServiceConfig,
    config: &WorkspaceConfig,
    registry: &EndpointRegistry,
    plugin_env: &BTreeMap<String, String>,
    consumer: ConsumerMode,
) -> BTreeMap<String, String> {
    let mut env = build_discovery_env_vars(registry, consumer);

    for (key, value) in plugin_env {
        let value = match consumer {
            ConsumerMode::Container => value.clone(),
            ConsumerMode::Host => rewrite_for_host(value, registry),
        };
        env.insert(key.clone(), value);
    }

    for (key, value) in &service.env {
        env.insert(key.clone(), value.clone());
    }

    env.insert("LO1_SERVICE_NAME".into(), service_name.to_string());
    env.insert("LO1_WORKSPACE_NAME".into(), config.name.clone());
    env
}

/// Rewrite container-network addresses for a host consumer: every occurrence
/// of `<service>:<port>` becomes `localhost:<hostPort>`.
fn rewrite_for_host(value: &str, registry: &EndpointRegistry) -> String {
    let mut rewritten = value.to_string();
    for endpoint in registry.endpoints.values() {
        rewritten = rewritten.replace(
            &format!("{}:{}", endpoint.name, endpoint.port),
            &format!("localhost:{}", endpoint.host_port),
        );
    }
    rewritten
}

fn upper_snake(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
