//! The `init` command: clone workspace repositories.

use std::path::Path;

use colored::Colorize;
use tokio::process::Command;

use crate::config::{RepositoryConfig, WorkspaceConfig};
use crate::error::{Error, Result};
use crate::orchestrator::MANIFEST_FILE;

/// Run `lo1 init [--fail-fast]`.
pub async fn run(workspace_dir: &Path, fail_fast: bool, json: bool) -> Result<()> {
    let config = WorkspaceConfig::load(&workspace_dir.join(MANIFEST_FILE)).await?;
    if config.repositories.is_empty() {
        if !json {
            println!("no repositories configured");
        }
        return Ok(());
    }

    let mut failures = Vec::new();
    for repo in &config.repositories {
        let target = workspace_dir.join(&repo.path);
        if target.exists() {
            if !json {
                println!("{} {} (exists)", "skip".dimmed(), repo.path);
            }
            continue;
        }
        match clone(repo, &target).await {
            Ok(()) => {
                if !json {
                    println!("{} {} -> {}", "cloned".green(), repo.url, repo.path);
                }
            }
            Err(e) => {
                if fail_fast {
                    return Err(e);
                }
                if !json {
                    eprintln!("{} {}: {e}", "failed".red(), repo.url);
                }
                failures.push(repo.url.clone());
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::orchestrator(format!(
            "failed to clone: {}",
            failures.join(", ")
        )))
    }
}

async fn clone(repo: &RepositoryConfig, target: &Path) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("clone");
    if let Some(branch) = &repo.branch {
        cmd.arg("--branch").arg(branch);
    }
    cmd.arg(&repo.url).arg(target);
    let output = cmd
        .output()
        .await
        .map_err(|e| Error::orchestrator(format!("failed to run git: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::orchestrator(format!(
            "git clone {} failed: {}",
            repo.url,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
