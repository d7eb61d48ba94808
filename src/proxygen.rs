//! Reverse-proxy (Caddy) configuration generator.
//!
//! Every registered service gets a routable domain, either the override from
//! its `proxy.domain` or the generated `<service>.<workspace>.<tld>`.
//! Container-mode services are reached over the workspace network; dev-mode
//! services are reached back on the host through `host.docker.internal`.

use std::fmt::Write as _;

use crate::config::{ServiceMode, WorkspaceConfig};
use crate::endpoints::EndpointRegistry;

/// Generated proxy artifacts
#[derive(Debug, Clone, Default)]
pub struct ProxyGeneration {
    /// Caddyfile content; empty when the proxy is disabled
    pub caddyfile: String,
    /// All routed domains, for the hosts block
    pub domains: Vec<String>,
}

/// Generate the Caddyfile and domain list for a workspace.
#[must_use]
pub fn generate_proxy_config(
    config: &WorkspaceConfig,
    registry: &EndpointRegistry,
) -> ProxyGeneration {
    if !config.proxy.as_ref().is_some_and(|p| p.enabled) {
        return ProxyGeneration::default();
    }
    let tls = config.tls_enabled();

    let mut caddyfile = String::new();
    if tls {
        // Caddy's internal CA signs the local domains; the trust helper
        // installs its root into the host store.
        caddyfile.push_str("{\n\tlocal_certs\n}\n\n");
    }

    let mut domains = Vec::new();
    for endpoint in registry.endpoints.values() {
        let service = &config.services[&endpoint.name];
        let domain = service
            .proxy
            .as_ref()
            .and_then(|p| p.domain.clone())
            .unwrap_or_else(|| format!("{}.{}.{}", endpoint.name, config.name, config.tld()));

        let upstream = match endpoint.mode {
            ServiceMode::Container => format!("{}:{}", endpoint.name, endpoint.port),
            _ => format!("host.docker.internal:{}", endpoint.host_port),
        };

        let site = if tls {
            domain.clone()
        } else {
            format!("http://{domain}")
        };
        let _ = writeln!(caddyfile, "{site} {{");
        match service.proxy.as_ref().and_then(|p| p.path_prefix.as_deref()) {
            Some(prefix) => {
                let prefix = prefix.trim_end_matches('/');
                let _ = writeln!(caddyfile, "\thandle_path {prefix}/* {{");
                let _ = writeln!(caddyfile, "\t\treverse_proxy {upstream}");
                let _ = writeln!(caddyfile, "\t}}");
            }
            None => {
                let _ = writeln!(caddyfile, "\treverse_proxy {upstream}");
            }
        }
        let _ = writeln!(caddyfile, "}}\n");
        domains.push(domain);
    }

    ProxyGeneration { caddyfile, domains }
}
