//! The `up` command: preflight, start, foreground wait, teardown.

use std::path::PathBuf;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::cli::printer::spawn_printer;
use crate::config::ServiceMode;
use crate::error::Result;
use crate::events::EventSender;
use crate::orchestrator::{
    start_workspace, stop_workspace, InMemoryRun, OrchestratorDeps, StartOptions, StopOptions,
};
use crate::paths;
use crate::prerequisites::check_docker;

/// Parsed `up` arguments
#[derive(Debug)]
pub struct UpArgs {
    /// Workspace root
    pub workspace_dir: PathBuf,
    /// Requested service subset
    pub services: Vec<String>,
    /// Mode override
    pub mode: Option<ServiceMode>,
    /// Return once ready
    pub detach: bool,
    /// Leave the stack running when the foreground run exits
    pub skip_teardown: bool,
    /// Clean teardown (volumes, orphans)
    pub clean: bool,
    /// JSON event output
    pub json: bool,
}

/// Run `lo1 up`.
pub async fn run(args: UpArgs) -> Result<()> {
    check_docker().await?;

    let deps = OrchestratorDeps::default();
    let (events, rx) = EventSender::channel();
    let printer = spawn_printer(rx, paths::logs_dir(&args.workspace_dir), args.json);

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let start_options = StartOptions {
        workspace_dir: args.workspace_dir.clone(),
        manifest_path: None,
        service_filter: args.services.clone(),
        mode_override: args.mode,
        probe_timeout: None,
    };

    let started = match start_workspace(&start_options, &deps, &events, &cancel).await {
        Ok(started) => started,
        Err(e) => {
            // Fall through to teardown so a half-started stack is reclaimed;
            // the original error is what the user sees.
            events
                .error(format!("startup failed, tearing down: {e}"))
                .await;
            let stop_options = StopOptions {
                workspace_dir: args.workspace_dir.clone(),
                clean: args.clean,
            };
            if let Err(stop_err) = stop_workspace(&stop_options, None, &deps, &events).await {
                events
                    .error(format!("teardown after failure also failed: {stop_err}"))
                    .await;
            }
            drop(events);
            let _ = printer.await;
            return Err(e);
        }
    };

    if args.detach {
        if let Some(logs) = started.logs_handle {
            logs.kill().await;
        }
        drop(events);
        let _ = printer.await;
        if !args.json {
            println!(
                "{} workspace '{}' is up ({} services)",
                "==>".blue().bold(),
                started.config.name,
                started.handles.len()
            );
        }
        return Ok(());
    }

    // Foreground: stream output until interrupted.
    cancel.cancelled().await;

    if args.skip_teardown {
        events
            .phase("Leaving workspace running (skip-teardown)")
            .await;
        if let Some(logs) = started.logs_handle {
            logs.kill().await;
        }
        drop(events);
        let _ = printer.await;
        return Ok(());
    }

    let stop_options = StopOptions {
        workspace_dir: args.workspace_dir,
        clean: args.clean,
    };
    let run = InMemoryRun {
        handles: started.handles,
        compose_options: started.compose_options,
        logs_handle: started.logs_handle,
    };
    let result = stop_workspace(&stop_options, Some(run), &deps, &events).await;
    drop(events);
    let _ = printer.await;
    result
}
