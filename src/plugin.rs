//! Typed workspace extensions.
//!
//! Plugins are compile-time-registered implementations of [`Plugin`]; the
//! manifest's `plugins` map binds a service type name to a registered
//! specifier. The orchestrator only consumes the lifecycle hooks: compose
//! contributions before generation, container configs at service start, and
//! the `provision_infra` / `seed_data` calls once infrastructure is up.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ServiceConfig, WorkspaceConfig, BUILTIN_TYPES};
use crate::endpoints::EndpointRegistry;
use crate::error::{Error, Result};
use crate::runner::ContainerRunConfig;

/// Compose services and env vars contributed by one plugin
#[derive(Debug, Clone, Default)]
pub struct ComposeContribution {
    /// Compose service definitions to merge into the generated document
    pub services: BTreeMap<String, serde_yaml::Value>,
    /// Env vars exposed to every service (host consumers get them rewritten)
    pub env_vars: BTreeMap<String, String>,
}

/// Shared context handed to plugin lifecycle hooks
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// The loaded workspace config
    pub config: Arc<WorkspaceConfig>,
    /// Derived endpoint registry
    pub registry: Arc<EndpointRegistry>,
    /// Workspace root directory
    pub workspace_dir: PathBuf,
}

/// A typed workspace extension
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The service type this plugin handles; must match the manifest key
    fn type_name(&self) -> &str;

    /// Container configuration for one service, when the plugin runs its
    /// services as standalone containers. `None` defers to the builtin
    /// runner decision table.
    fn container_config(
        &self,
        _service_name: &str,
        _service: &ServiceConfig,
        _config: &WorkspaceConfig,
    ) -> Option<ContainerRunConfig> {
        None
    }

    /// Compose services and env vars for all services of this type.
    fn compose_contribution(
        &self,
        _services: &[(&str, &ServiceConfig)],
        _config: &WorkspaceConfig,
    ) -> Result<Option<ComposeContribution>> {
        Ok(None)
    }

    /// Provision backing infrastructure (databases, topics). Runs in
    /// parallel with other plugins after the infra containers are ready.
    async fn provision_infra(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Seed development data. Runs in parallel after provisioning.
    async fn seed_data(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }
}

/// Compile-time plugin registry, keyed by specifier
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("specifiers", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under a specifier (e.g. `builtin:redis`)
    pub fn register(&mut self, specifier: impl Into<String>, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(specifier.into(), plugin);
    }

    /// Resolve the manifest's plugin declarations.
    ///
    /// Each declared specifier must be registered, the resolved plugin's
    /// `type_name` must match the declared key, and every non-builtin
    /// service type must have a declaration.
    pub fn resolve(&self, config: &WorkspaceConfig) -> Result<BTreeMap<String, Arc<dyn Plugin>>> {
        let mut resolved = BTreeMap::new();
        for (type_name, specifier) in &config.plugins {
            let plugin = self.plugins.get(specifier).ok_or_else(|| {
                Error::plugin(type_name, format!("no plugin registered for '{specifier}'"))
            })?;
            if plugin.type_name() != type_name {
                return Err(Error::plugin(
                    type_name,
                    format!(
                        "'{specifier}' declares type '{}', manifest binds it to '{type_name}'",
                        plugin.type_name()
                    ),
                ));
            }
            resolved.insert(type_name.clone(), Arc::clone(plugin));
        }

        for (service_name, service) in &config.services {
            if !BUILTIN_TYPES.contains(&service.service_type.as_str())
                && !resolved.contains_key(&service.service_type)
            {
                return Err(Error::orchestrator(format!(
                    "service '{service_name}' has type '{}' with no declared plugin",
                    service.service_type
                )));
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RedisPlugin;

    #[async_trait]
    impl Plugin for RedisPlugin {
        fn type_name(&self) -> &str {
            "redis"
        }

        fn compose_contribution(
            &self,
            services: &[(&str, &ServiceConfig)],
            config: &WorkspaceConfig,
        ) -> Result<Option<ComposeContribution>> {
            let mut contribution = ComposeContribution::default();
            for (name, _) in services {
                contribution.services.insert(
                    (*name).to_string(),
                    serde_yaml::from_str("image: redis:7-alpine").unwrap(),
                );
                contribution.env_vars.insert(
                    format!("{}_URL", name.to_uppercase()),
                    format!("redis://{name}:6379"),
                );
            }
            let _ = config;
            Ok(Some(contribution))
        }
    }

    fn config(yaml: &str) -> WorkspaceConfig {
        WorkspaceConfig::parse(yaml).unwrap()
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry.register("builtin:redis", Arc::new(RedisPlugin));
        registry
    }

    #[test]
    fn test_resolves_declared_plugin() {
        let config = config(
            r#"
version: "1"
name: shop
plugins:
  redis: builtin:redis
services:
  cache:
    type: redis
    path: ./cache
"#,
        );
        let resolved = registry().resolve(&config).unwrap();
        assert!(resolved.contains_key("redis"));
    }

    #[test]
    fn test_unknown_specifier_fails() {
        let config = config(
            r#"
version: "1"
name: shop
plugins:
  redis: builtin:missing
services: {}
"#,
        );
        let err = match registry().resolve(&config) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, Error::Plugin { .. }));
    }

    #[test]
    fn test_type_name_mismatch_fails() {
        let config = config(
            r#"
version: "1"
name: shop
plugins:
  postgres: builtin:redis
services: {}
"#,
        );
        let err = match registry().resolve(&config) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        match err {
            Error::Plugin { plugin, message } => {
                assert_eq!(plugin, "postgres");
                assert!(message.contains("redis"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undeclared_plugin_type_fails() {
        let config = config(
            r#"
version: "1"
name: shop
services:
  cache:
    type: redis
    path: ./cache
"#,
        );
        let err = match registry().resolve(&config) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, Error::Orchestrator { .. }));
    }

    #[test]
    fn test_contribution_collects_services_and_env() {
        let config = config(
            r#"
version: "1"
name: shop
plugins:
  redis: builtin:redis
services:
  cache:
    type: redis
    path: ./cache
"#,
        );
        let plugin = RedisPlugin;
        let services: Vec<(&str, &ServiceConfig)> = config
            .services
            .iter()
            .map(|(name, svc)| (name.as_str(), svc))
            .collect();
        let contribution = plugin
            .compose_contribution(&services, &config)
            .unwrap()
            .unwrap();
        assert!(contribution.services.contains_key("cache"));
        assert_eq!(contribution.env_vars["CACHE_URL"], "redis://cache:6379");
    }
}
