//! Workspace teardown.

use crate::compose::{ComposeOptions, LogsHandle};
use crate::config::WorkspaceConfig;
use crate::endpoints::{build_discovery_env_vars, build_endpoint_registry, ConsumerMode};
use crate::error::Result;
use crate::events::{EventSender, ServiceStatus};
use crate::hooks::{execute_hook, HookOptions};
use crate::orchestrator::{OrchestratorDeps, StopOptions, MANIFEST_FILE};
use crate::runner::{Recovered, ServiceHandle};
use crate::state::WorkspaceState;

/// A foreground run handing its live handles to `stop`
pub struct InMemoryRun {
    /// Handles from the `up` that is now exiting
    pub handles: Vec<ServiceHandle>,
    /// Compose options of the running project
    pub compose_options: ComposeOptions,
    /// Log follower to kill once services are down
    pub logs_handle: Option<LogsHandle>,
}

/// Stop a running workspace.
///
/// With no state file this is a no-op. In-memory handles (the foreground
/// `up` exiting) are preferred over hydrating from state. Services stop
/// sequentially so the log output stays readable and the container daemon is
/// not thrashed; then the compose project comes down and the state file is
/// removed. The hosts block is deliberately left in place — `lo1 hosts
/// --remove` owns that.
pub async fn stop_workspace(
    options: &StopOptions,
    in_memory: Option<InMemoryRun>,
    deps: &OrchestratorDeps,
    events: &EventSender,
) -> Result<()> {
    let workspace_dir = options.workspace_dir.as_path();
    let Some(state) = WorkspaceState::load(workspace_dir).await? else {
        events.phase("No running workspace found").await;
        return Ok(());
    };

    // Config is advisory here: a deleted manifest must not block teardown.
    let config = WorkspaceConfig::load(&workspace_dir.join(MANIFEST_FILE))
        .await
        .ok();

    if let Some(config) = &config {
        if let Some(command) = config.hooks.as_ref().and_then(|h| h.pre_stop.as_deref()) {
            // Runs before any handle is stopped, also for in-memory stops.
            let cancel = tokio_util::sync::CancellationToken::new();
            match execute_hook(
                "preStop",
                command,
                HookOptions {
                    cwd: workspace_dir.to_path_buf(),
                    env: stop_hook_env(config),
                },
                events,
                &cancel,
            )
            .await
            {
                Ok(result) => events.hook(result.hook_name, result.output).await,
                Err(e) => events.error(format!("preStop hook failed: {e}")).await,
            }
        }
    }

    let (handles, compose_options, logs_handle) = match in_memory {
        Some(run) => (run.handles, run.compose_options, run.logs_handle),
        None => (hydrate_handles(&state), state.compose_options(), None),
    };

    for handle in &handles {
        events
            .service(&handle.service_name, ServiceStatus::Stopping)
            .await;
        run_service_pre_stop(config.as_ref(), handle, workspace_dir, events).await;
        if let Err(e) = handle.stop(None).await {
            events
                .error(format!("stop of '{}' failed: {e}", handle.service_name))
                .await;
        }
        events
            .service(&handle.service_name, ServiceStatus::Stopped)
            .await;
    }

    if let Some(logs) = logs_handle {
        logs.kill().await;
    }

    deps.compose.down(&compose_options, options.clean).await?;
    WorkspaceState::remove(workspace_dir).await?;
    events.phase("Stopped").await;
    Ok(())
}

fn hydrate_handles(state: &WorkspaceState) -> Vec<ServiceHandle> {
    state
        .services
        .iter()
        .map(|(name, service)| {
            ServiceHandle::recovered(
                name,
                Recovered {
                    kind: service.runner,
                    pid: service.pid,
                    container_id: service.container_id.clone(),
                },
            )
        })
        .collect()
}

async fn run_service_pre_stop(
    config: Option<&WorkspaceConfig>,
    handle: &ServiceHandle,
    workspace_dir: &std::path::Path,
    events: &EventSender,
) {
    let Some(config) = config else { return };
    let Some(service) = config.services.get(&handle.service_name) else {
        return;
    };
    let Some(command) = service.hooks.as_ref().and_then(|h| h.pre_stop.as_deref()) else {
        return;
    };
    let cancel = tokio_util::sync::CancellationToken::new();
    let hook_name = format!("{}:preStop", handle.service_name);
    let candidate = workspace_dir.join(&service.path);
    let cwd = if candidate.is_dir() {
        candidate
    } else {
        workspace_dir.to_path_buf()
    };
    match execute_hook(
        &hook_name,
        command,
        HookOptions {
            cwd,
            env: stop_hook_env(config),
        },
        events,
        &cancel,
    )
    .await
    {
        Ok(result) => events.hook(result.hook_name, result.output).await,
        Err(e) => {
            // A failing preStop never blocks the stop itself.
            events.error(format!("{hook_name} failed: {e}")).await;
        }
    }
}

fn stop_hook_env(config: &WorkspaceConfig) -> std::collections::BTreeMap<String, String> {
    let registry = build_endpoint_registry(config);
    let mut env = build_discovery_env_vars(&registry, ConsumerMode::Host);
    env.insert("LO1_WORKSPACE_NAME".into(), config.name.clone());
    env
}
