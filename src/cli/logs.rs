//! The `logs` command: read captured per-service log files.

use std::path::Path;

use colored::Colorize;

use crate::error::{Error, Result};
use crate::paths;

/// Run `lo1 logs [<service>] [--list]`.
pub async fn run(workspace_dir: &Path, service: Option<String>, list: bool) -> Result<()> {
    let logs_dir = paths::logs_dir(workspace_dir);
    let mut names = captured_services(&logs_dir).await?;
    names.sort();

    if list {
        if names.is_empty() {
            println!("no captured logs");
        }
        for name in names {
            println!("{name}");
        }
        return Ok(());
    }

    let targets = match service {
        Some(service) => {
            if !names.contains(&service) {
                return Err(Error::orchestrator(format!(
                    "no captured logs for service '{service}'"
                )));
            }
            vec![service]
        }
        None => names,
    };

    for name in targets {
        let path = logs_dir.join(format!("{name}.log"));
        let content = tokio::fs::read_to_string(&path).await?;
        println!("{} {}", "==>".blue().bold(), name.bold());
        print!("{content}");
    }
    Ok(())
}

async fn captured_services(logs_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(logs_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(service) = name.strip_suffix(".log") {
            names.push(service.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_captured_services() {
        let dir = tempfile::tempdir().unwrap();
        let logs = paths::logs_dir(dir.path());
        tokio::fs::create_dir_all(&logs).await.unwrap();
        tokio::fs::write(logs.join("api.log"), "x\n").await.unwrap();
        tokio::fs::write(logs.join("db.log"), "y\n").await.unwrap();

        let mut names = captured_services(&logs).await.unwrap();
        names.sort();
        assert_eq!(names, ["api", "db"]);
    }

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let names = captured_services(&paths::logs_dir(dir.path())).await.unwrap();
        assert!(names.is_empty());
    }
}
