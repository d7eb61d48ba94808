//! The `status` command: recorded run plus live container states.

use std::path::Path;

use colored::Colorize;

use crate::compose::{ComposeCli, ComposeEngine, PsEntry};
use crate::error::Result;
use crate::state::WorkspaceState;

/// Run `lo1 status`.
pub async fn run(workspace_dir: &Path, json: bool) -> Result<()> {
    let Some(state) = WorkspaceState::load(workspace_dir).await? else {
        if json {
            println!("{}", serde_json::json!({ "running": false }));
        } else {
            println!("No running workspace found");
        }
        return Ok(());
    };

    // Live container info is best-effort; the recorded run is still worth
    // printing when the daemon is unreachable.
    let containers = ComposeCli
        .ps(&state.compose_options())
        .await
        .unwrap_or_default();

    if json {
        println!("{}", status_json(&state, &containers));
        return Ok(());
    }

    println!(
        "{} workspace '{}' (project {})",
        "==>".blue().bold(),
        state.workspace_name,
        state.project_name
    );
    for (name, service) in &state.services {
        let where_ = match (&service.pid, &service.container_id) {
            (Some(pid), _) => format!("pid {pid}"),
            (_, Some(id)) => id.clone(),
            _ => "compose".to_string(),
        };
        println!("  {} {} ({})", name.cyan(), service.runner, where_.dimmed());
    }
    if !containers.is_empty() {
        println!("{} containers", "==>".blue().bold());
        for entry in &containers {
            let state_str = match entry.state.as_str() {
                "running" => entry.state.green(),
                "exited" => entry.state.dimmed(),
                other => other.yellow(),
            };
            let health = if entry.health.is_empty() {
                String::new()
            } else {
                format!(" ({})", entry.health)
            };
            println!("  {} {state_str}{health}", entry.service.cyan());
        }
    }
    Ok(())
}

fn status_json(state: &WorkspaceState, containers: &[PsEntry]) -> serde_json::Value {
    serde_json::json!({
        "running": true,
        "workspace": &state.workspace_name,
        "project": &state.project_name,
        "services": &state.services,
        "containers": containers
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "service": &entry.service,
                    "state": &entry.state,
                    "health": &entry.health,
                    "exitCode": entry.exit_code,
                })
            })
            .collect::<Vec<_>>(),
    })
}
