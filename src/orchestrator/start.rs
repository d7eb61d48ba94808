//! Workspace startup: stale cleanup through the Ready phase.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::compose::{ComposeOptions, LogsHandle, WaitOptions};
use crate::composegen;
use crate::config::{ServiceMode, WorkspaceConfig};
use crate::dag::build_dag;
use crate::endpoints::{build_discovery_env_vars, build_endpoint_registry, ConsumerMode};
use crate::error::{Error, Result};
use crate::events::{EventSender, ServiceStatus};
use crate::filter::resolve_service_filter;
use crate::hooks::{execute_hook, HookOptions};
use crate::hosts::generate_hosts_block;
use crate::orchestrator::{OrchestratorDeps, StartOptions, StartedWorkspace};
use crate::paths;
use crate::plugin::{ComposeContribution, Plugin, PluginContext};
use crate::proxygen::generate_proxy_config;
use crate::runner::{Recovered, ServiceHandle};
use crate::service::{start_service, ServiceStart};
use crate::state::{ServiceState, WorkspaceState};

/// Bring the whole workspace up.
///
/// Phases, in order: stale cleanup, config load, DAG and endpoint registry,
/// plugin resolution, compose generation, proxy and hosts setup, baseline
/// state, infra and app compose phases (each gated by readiness), TLS trust,
/// infrastructure hooks, service layers, state update, `postSetup`, Ready.
///
/// Cancellation is honored before each compose phase and before each layer;
/// once any service has started, cancellation and failure share the same
/// best-effort teardown of every handle produced so far.
pub async fn start_workspace(
    options: &StartOptions,
    deps: &OrchestratorDeps,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<StartedWorkspace> {
    if cancel.is_cancelled() {
        return Err(Error::orchestrator("startup cancelled"));
    }
    let workspace_dir = options.workspace_dir.as_path();

    stale_cleanup(workspace_dir, deps, events).await;

    events.phase("Loading configuration").await;
    let mut config = WorkspaceConfig::load(&options.manifest()).await?;
    if let Some(mode) = options.mode_override {
        config.apply_mode_override(mode);
    }
    if !options.service_filter.is_empty() {
        let keep = resolve_service_filter(&options.service_filter, &config)?;
        config.retain_services(&keep);
    }

    let plan = build_dag(&config)?;
    let registry = build_endpoint_registry(&config);

    events.phase("Loading plugins").await;
    let plugins = deps.plugins.resolve(&config)?;
    let contributions = collect_contributions(&config, &plugins)?;
    let plugin_env = contributions.env_vars.clone();

    events.phase("Generating compose project").await;
    let generation = composegen::generate(&config, &contributions, workspace_dir).await?;
    let compose_options = ComposeOptions {
        project_name: config.project_name(),
        file_args: generation.file_args.clone(),
        cwd: workspace_dir.to_path_buf(),
    };

    let proxy = generate_proxy_config(&config, &registry);
    if !proxy.caddyfile.is_empty() {
        tokio::fs::write(paths::caddyfile(workspace_dir), &proxy.caddyfile).await?;
    }
    let hosts_block = generate_hosts_block(&proxy.domains);
    if !hosts_block.is_empty() {
        events.phase("Updating hosts file").await;
        deps.hosts.apply(&hosts_block).await?;
    }

    // From here on a crashed run is recoverable: the project and files are
    // on record even though no service is yet.
    let mut state = WorkspaceState::baseline(
        &config.name,
        generation.file_args.clone(),
        workspace_dir.to_path_buf(),
    );
    state.save(workspace_dir).await?;

    let mut logs_handle: Option<LogsHandle> = None;
    if !generation.infra_services.is_empty() {
        if cancel.is_cancelled() {
            return Err(Error::orchestrator("cancelled before infrastructure"));
        }
        events.phase("Starting infrastructure").await;
        deps.compose
            .up(&compose_options, &generation.infra_services, events, cancel)
            .await?;
        logs_handle = Some(deps.compose.logs(&compose_options, events).await?);
        deps.compose
            .wait(
                &compose_options,
                WaitOptions::for_services(
                    generation.infra_services.clone(),
                    generation.infra_init_tasks(),
                ),
                cancel,
            )
            .await?;
    }

    if !generation.app_services.is_empty() {
        if cancel.is_cancelled() {
            return Err(Error::orchestrator("cancelled before application containers"));
        }
        events.phase("Starting application containers").await;
        deps.compose
            .up(&compose_options, &generation.app_services, events, cancel)
            .await?;
        if logs_handle.is_none() {
            logs_handle = Some(deps.compose.logs(&compose_options, events).await?);
        }
        deps.compose
            .wait(
                &compose_options,
                WaitOptions::for_services(
                    generation.app_services.clone(),
                    generation.app_init_tasks(),
                ),
                cancel,
            )
            .await?;
    }

    if config.tls_enabled() {
        events.phase("Installing TLS trust").await;
        deps.tls
            .trust_caddy_ca(&config.proxy_service_name(), workspace_dir)
            .await?;
    }

    let workspace_hook_env = workspace_hook_env(&config, &registry, &plugin_env);
    if let Some(command) = config
        .hooks
        .as_ref()
        .and_then(|h| h.post_infrastructure.as_deref())
    {
        run_workspace_hook(
            "postInfrastructure",
            command,
            workspace_dir,
            &workspace_hook_env,
            events,
            cancel,
        )
        .await?;
    }

    let ctx = PluginContext {
        config: Arc::new(config.clone()),
        registry: Arc::new(registry.clone()),
        workspace_dir: workspace_dir.to_path_buf(),
    };
    if !plugins.is_empty() {
        events.phase("Provisioning infrastructure").await;
        join_plugin_calls(plugins.values().map(|p| p.provision_infra(&ctx))).await?;
        join_plugin_calls(plugins.values().map(|p| p.seed_data(&ctx))).await?;
    }

    events.phase("Starting services").await;
    let mut handles: Vec<ServiceHandle> = Vec::new();
    for layer in &plan.layers {
        if cancel.is_cancelled() {
            teardown_handles(&handles, events).await;
            return Err(Error::orchestrator("cancelled between service layers"));
        }
        let starts = layer
            .iter()
            .filter(|name| config.services[*name].mode != ServiceMode::Skip)
            .map(|name| {
                let config = &config;
                let registry = &registry;
                let plugin_env = &plugin_env;
                let plugins = &plugins;
                let events = events.clone();
                async move {
                    events.service(name, ServiceStatus::Starting).await;
                    let service = &config.services[name];
                    let result = start_service(
                        ServiceStart {
                            service_name: name,
                            service,
                            config,
                            plugin: plugins
                                .get(&service.service_type)
                                .map(|p| p.as_ref() as &dyn Plugin),
                            registry,
                            plugin_env,
                            workspace_dir,
                            probe_timeout: options.probe_timeout,
                        },
                        &events,
                        cancel,
                    )
                    .await;
                    if result.is_ok() {
                        events.service(name, ServiceStatus::Started).await;
                    }
                    result
                }
            });

        // Settled-all join: siblings finish (and get cleaned up) even when
        // one of them fails.
        let results = join_all(starts).await;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(error) = first_error {
            events.error(format!("service start failed: {error}")).await;
            teardown_handles(&handles, events).await;
            return Err(error);
        }
    }

    for handle in &handles {
        state.services.insert(
            handle.service_name.clone(),
            ServiceState {
                runner: handle.kind,
                pid: handle.pid(),
                container_id: handle.container_id().map(ToString::to_string),
            },
        );
    }
    state.save(workspace_dir).await?;

    if let Some(command) = config.hooks.as_ref().and_then(|h| h.post_setup.as_deref()) {
        run_workspace_hook(
            "postSetup",
            command,
            workspace_dir,
            &workspace_hook_env,
            events,
            cancel,
        )
        .await?;
    }

    events.phase("Ready").await;
    Ok(StartedWorkspace {
        config: Arc::new(config),
        handles,
        compose_options,
        logs_handle,
    })
}

/// Tear down a previous run recorded in the state file. Best effort: every
/// failure is reported and swallowed so the new run can proceed.
async fn stale_cleanup(workspace_dir: &Path, deps: &OrchestratorDeps, events: &EventSender) {
    let state = match WorkspaceState::load(workspace_dir).await {
        Ok(Some(state)) => state,
        Ok(None) => return,
        Err(e) => {
            events
                .error(format!("unreadable state file, discarding: {e}"))
                .await;
            let _ = WorkspaceState::remove(workspace_dir).await;
            return;
        }
    };

    events
        .phase(format!(
            "Cleaning up stale workspace '{}'",
            state.workspace_name
        ))
        .await;
    for (name, service) in &state.services {
        let handle = ServiceHandle::recovered(
            name,
            Recovered {
                kind: service.runner,
                pid: service.pid,
                container_id: service.container_id.clone(),
            },
        );
        if let Err(e) = handle.stop(None).await {
            events
                .error(format!("stale cleanup of '{name}' failed: {e}"))
                .await;
        }
    }
    if let Err(e) = deps.compose.down(&state.compose_options(), false).await {
        events.error(format!("stale compose down failed: {e}")).await;
    }
    if let Err(e) = WorkspaceState::remove(workspace_dir).await {
        events
            .error(format!("cannot remove stale state file: {e}"))
            .await;
    }
}

fn collect_contributions(
    config: &WorkspaceConfig,
    plugins: &BTreeMap<String, Arc<dyn Plugin>>,
) -> Result<ComposeContribution> {
    let mut merged = ComposeContribution::default();
    for (type_name, plugin) in plugins {
        let services: Vec<(&str, &crate::config::ServiceConfig)> = config
            .services
            .iter()
            .filter(|(_, svc)| &svc.service_type == type_name)
            .map(|(name, svc)| (name.as_str(), svc))
            .collect();
        let Some(contribution) = plugin.compose_contribution(&services, config)? else {
            continue;
        };
        for (name, definition) in contribution.services {
            if merged.services.insert(name.clone(), definition).is_some() {
                return Err(Error::compose(format!(
                    "two plugins contributed compose service '{name}'"
                )));
            }
        }
        merged.env_vars.extend(contribution.env_vars);
    }
    Ok(merged)
}

fn workspace_hook_env(
    config: &WorkspaceConfig,
    registry: &crate::endpoints::EndpointRegistry,
    plugin_env: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = build_discovery_env_vars(registry, ConsumerMode::Host);
    env.extend(plugin_env.clone());
    env.insert("LO1_WORKSPACE_NAME".into(), config.name.clone());
    env
}

async fn run_workspace_hook(
    hook: &str,
    command: &str,
    workspace_dir: &Path,
    env: &BTreeMap<String, String>,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<()> {
    let result = execute_hook(
        hook,
        command,
        HookOptions {
            cwd: workspace_dir.to_path_buf(),
            env: env.clone(),
        },
        events,
        cancel,
    )
    .await?;
    events.hook(result.hook_name, result.output).await;
    Ok(())
}

async fn join_plugin_calls(
    calls: impl Iterator<Item = impl std::future::Future<Output = Result<()>>>,
) -> Result<()> {
    let results = join_all(calls).await;
    for result in results {
        result?;
    }
    Ok(())
}

/// Stop every handle in reverse start order, reporting but swallowing
/// individual failures.
pub(crate) async fn teardown_handles(handles: &[ServiceHandle], events: &EventSender) {
    for handle in handles.iter().rev() {
        events
            .service(&handle.service_name, ServiceStatus::Stopping)
            .await;
        if let Err(e) = handle.stop(None).await {
            events
                .error(format!("teardown of '{}' failed: {e}", handle.service_name))
                .await;
        }
        events
            .service(&handle.service_name, ServiceStatus::Stopped)
            .await;
    }
}
