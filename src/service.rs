//! Service starter.
//!
//! Picks the runner for one service, assembles its environment, and wraps
//! the start in its lifecycle: `preStart` hook, runner spawn, readiness
//! probe, `postStart` hook. A probe or post-start failure stops the runner
//! again before the error propagates, so a failed start never leaks a
//! running process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{ServiceConfig, ServiceMode, WorkspaceConfig};
use crate::endpoints::{build_service_env, ConsumerMode, EndpointRegistry};
use crate::error::{Error, Result};
use crate::events::EventSender;
use crate::hooks::{execute_hook, HookOptions};
use crate::plugin::Plugin;
use crate::probe::{wait_for_ready, ProbeOptions};
use crate::runner::{
    start_container, start_process, ContainerOptions, ProcessOptions, ServiceHandle,
};

/// Everything the starter needs for one service
pub struct ServiceStart<'a> {
    /// Service name
    pub service_name: &'a str,
    /// The service's manifest entry
    pub service: &'a ServiceConfig,
    /// The whole workspace config
    pub config: &'a WorkspaceConfig,
    /// Plugin bound to the service's type, when it has one
    pub plugin: Option<&'a dyn Plugin>,
    /// Derived endpoint registry
    pub registry: &'a EndpointRegistry,
    /// Env vars contributed by plugins
    pub plugin_env: &'a BTreeMap<String, String>,
    /// Workspace root
    pub workspace_dir: &'a Path,
    /// Readiness probe budget override; probe default when `None`
    pub probe_timeout: Option<Duration>,
}

enum RunnerChoice {
    PluginContainer(crate::runner::ContainerRunConfig),
    Process(String),
    ComposeManaged,
}

/// Start one service and return its handle.
pub async fn start_service(
    request: ServiceStart<'_>,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<ServiceHandle> {
    let ServiceStart {
        service_name,
        service,
        config,
        plugin,
        registry,
        plugin_env,
        workspace_dir,
        probe_timeout,
    } = request;

    let choice = choose_runner(service_name, service, config, plugin)?;
    let consumer = match &choice {
        RunnerChoice::PluginContainer(_) | RunnerChoice::ComposeManaged => ConsumerMode::Container,
        RunnerChoice::Process(_) => ConsumerMode::Host,
    };
    let service_env = build_service_env(
        service_name,
        service,
        config,
        registry,
        plugin_env,
        consumer,
    );
    // Hooks always run on the host, whatever the service's own runner is.
    let hook_env = build_service_env(
        service_name,
        service,
        config,
        registry,
        plugin_env,
        ConsumerMode::Host,
    );
    let hook_cwd = resolve_hook_cwd(workspace_dir, &service.path);

    if let Some(command) = service.hooks.as_ref().and_then(|h| h.pre_start.as_deref()) {
        run_service_hook(
            service_name,
            "preStart",
            command,
            &hook_cwd,
            &hook_env,
            events,
            cancel,
        )
        .await?;
    }

    if cancel.is_cancelled() {
        return Err(Error::orchestrator(format!(
            "start of '{service_name}' cancelled"
        )));
    }

    let handle = match choice {
        RunnerChoice::PluginContainer(container_config) => {
            let mut ports = container_config.ports.clone();
            if let (Some(port), Some(host_port)) = (service.port, service.effective_host_port()) {
                if !ports.iter().any(|(_, c)| *c == port) {
                    ports.push((host_port, port));
                }
            }
            let handle = start_container(
                ContainerOptions {
                    workspace_name: config.name.clone(),
                    service_name: service_name.to_string(),
                    container_name: config.container_name(service_name),
                    network_name: config.network_name(),
                    config: crate::runner::ContainerRunConfig {
                        ports,
                        ..container_config
                    },
                    env: service_env,
                },
                events,
            )
            .await?;
            ServiceHandle::container(service_name, handle)
        }
        RunnerChoice::Process(command) => {
            let handle = start_process(
                ProcessOptions {
                    service_name: service_name.to_string(),
                    command,
                    cwd: hook_cwd.clone(),
                    env: service_env,
                },
                events,
            )
            .await?;
            ServiceHandle::process(service_name, handle)
        }
        RunnerChoice::ComposeManaged => ServiceHandle::passive(service_name),
    };

    if let Some(url) = &service.readiness_probe {
        let mut options = ProbeOptions::new(service_name, url);
        if let Some(timeout) = probe_timeout {
            options.timeout = timeout;
        }
        if let Err(probe_err) = wait_for_ready(&options, cancel).await {
            if let Err(stop_err) = handle.stop(None).await {
                tracing::warn!(
                    service = service_name,
                    error = %stop_err,
                    "teardown after failed probe also failed"
                );
            }
            return Err(probe_err);
        }
    }

    if let Some(command) = service.hooks.as_ref().and_then(|h| h.post_start.as_deref()) {
        if let Err(hook_err) = run_service_hook(
            service_name,
            "postStart",
            command,
            &hook_cwd,
            &hook_env,
            events,
            cancel,
        )
        .await
        {
            let _ = handle.stop(None).await;
            return Err(hook_err);
        }
    }

    Ok(handle)
}

fn choose_runner(
    service_name: &str,
    service: &ServiceConfig,
    config: &WorkspaceConfig,
    plugin: Option<&dyn Plugin>,
) -> Result<RunnerChoice> {
    if service.mode == ServiceMode::Skip {
        return Err(Error::service_start(service_name, "service mode is skip"));
    }
    if let Some(plugin) = plugin {
        if let Some(container_config) = plugin.container_config(service_name, service, config) {
            return Ok(RunnerChoice::PluginContainer(container_config));
        }
    }
    if service.is_builtin_type() && service.mode == ServiceMode::Dev {
        if let Some(command) = &service.command {
            return Ok(RunnerChoice::Process(command.clone()));
        }
    }
    if service.mode == ServiceMode::Container
        && (service.container_image.is_some() || service.compose.is_some())
    {
        return Ok(RunnerChoice::ComposeManaged);
    }
    Err(Error::service_start(
        service_name,
        format!(
            "no runner for type '{}' in mode '{}'",
            service.service_type, service.mode
        ),
    ))
}

async fn run_service_hook(
    service_name: &str,
    hook: &str,
    command: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<()> {
    let hook_name = format!("{service_name}:{hook}");
    let result = execute_hook(
        &hook_name,
        command,
        HookOptions {
            cwd: cwd.to_path_buf(),
            env: env.clone(),
        },
        events,
        cancel,
    )
    .await?;
    events.hook(result.hook_name, result.output).await;
    Ok(())
}

/// Hooks and dev processes run from the service's source directory when it
/// exists, the workspace root otherwise.
fn resolve_hook_cwd(workspace_dir: &Path, service_path: &str) -> PathBuf {
    let candidate = workspace_dir.join(service_path);
    if candidate.is_dir() {
        candidate
    } else {
        workspace_dir.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::build_endpoint_registry;

    fn config(extra: &str) -> WorkspaceConfig {
        WorkspaceConfig::parse(&format!(
            "version: \"1\"\nname: test\nservices:\n{extra}"
        ))
        .unwrap()
    }

    fn request<'a>(
        config: &'a WorkspaceConfig,
        registry: &'a EndpointRegistry,
        plugin_env: &'a BTreeMap<String, String>,
        name: &'a str,
        workspace_dir: &'a Path,
    ) -> ServiceStart<'a> {
        ServiceStart {
            service_name: name,
            service: &config.services[name],
            config,
            plugin: None,
            registry,
            plugin_env,
            workspace_dir,
            probe_timeout: None,
        }
    }

    #[tokio::test]
    async fn test_dev_service_runs_as_process() {
        let dir = tempfile::tempdir().unwrap();
        let config = config("  api:\n    type: service\n    path: ./api\n    command: sleep 5\n");
        let registry = build_endpoint_registry(&config);
        let plugin_env = BTreeMap::new();
        let (events, _rx) = EventSender::channel();
        let cancel = CancellationToken::new();

        let handle = start_service(
            request(&config, &registry, &plugin_env, "api", dir.path()),
            &events,
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(handle.kind, crate::runner::RunnerKind::Process);
        assert!(handle.is_running());
        assert!(handle.pid().is_some());
        handle.stop(Some(Duration::from_millis(200))).await.unwrap();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_container_mode_returns_passive_handle() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            "  db:\n    type: service\n    path: ./db\n    mode: container\n    containerImage: postgres:16\n",
        );
        let registry = build_endpoint_registry(&config);
        let plugin_env = BTreeMap::new();
        let (events, _rx) = EventSender::channel();
        let cancel = CancellationToken::new();

        let handle = start_service(
            request(&config, &registry, &plugin_env, "db", dir.path()),
            &events,
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(handle.kind, crate::runner::RunnerKind::Compose);
        handle.stop(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_failure_stops_runner() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            "  api:\n    type: service\n    path: ./api\n    command: sleep 60\n    readinessProbe: http://localhost:1/unused\n",
        );
        let registry = build_endpoint_registry(&config);
        let plugin_env = BTreeMap::new();
        let (events, _rx) = EventSender::channel();
        let cancel = CancellationToken::new();

        let mut req = request(&config, &registry, &plugin_env, "api", dir.path());
        req.probe_timeout = Some(Duration::from_millis(100));
        let err = start_service(req, &events, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::ReadinessProbe { .. }));
        // The sleep was torn down with the probe; nothing to observe beyond
        // the error, but give the group kill a moment to land.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_pre_start_hook_failure_aborts_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            "  api:\n    type: service\n    path: ./api\n    command: sleep 60\n    hooks:\n      preStart: exit 9\n",
        );
        let registry = build_endpoint_registry(&config);
        let plugin_env = BTreeMap::new();
        let (events, _rx) = EventSender::channel();
        let cancel = CancellationToken::new();

        let err = start_service(
            request(&config, &registry, &plugin_env, "api", dir.path()),
            &events,
            &cancel,
        )
        .await
        .unwrap_err();
        match err {
            Error::Hook { hook, exit_code } => {
                assert_eq!(hook, "api:preStart");
                assert_eq!(exit_code, Some(9));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_no_runner_is_service_start_error() {
        let dir = tempfile::tempdir().unwrap();
        // Plugin type, no plugin bound, no image: nothing can run it.
        let config = config("  cache:\n    type: redis\n    path: ./cache\n");
        let registry = build_endpoint_registry(&config);
        let plugin_env = BTreeMap::new();
        let (events, _rx) = EventSender::channel();
        let cancel = CancellationToken::new();

        let err = start_service(
            request(&config, &registry, &plugin_env, "cache", dir.path()),
            &events,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ServiceStart { .. }));
    }

    #[tokio::test]
    async fn test_hooks_run_in_order_around_runner() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("order.txt");
        let config = config(&format!(
            concat!(
                "  api:\n",
                "    type: service\n",
                "    path: ./api\n",
                "    command: sleep 5\n",
                "    hooks:\n",
                "      preStart: echo pre >> {m}\n",
                "      postStart: echo post >> {m}\n",
            ),
            m = marker.display()
        ));
        let registry = build_endpoint_registry(&config);
        let plugin_env = BTreeMap::new();
        let (events, _rx) = EventSender::channel();
        let cancel = CancellationToken::new();

        let handle = start_service(
            request(&config, &registry, &plugin_env, "api", dir.path()),
            &events,
            &cancel,
        )
        .await
        .unwrap();
        let order = tokio::fs::read_to_string(&marker).await.unwrap();
        assert_eq!(order, "pre\npost\n");
        handle.stop(Some(Duration::from_millis(200))).await.unwrap();
    }
}
