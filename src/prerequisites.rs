//! Docker preflight checks.
//!
//! `up` refuses to mutate anything before confirming the `docker` binary is
//! on `PATH`, the daemon answers, and the compose plugin is installed.

use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};

/// What the preflight check found
#[derive(Debug, Clone)]
pub struct DockerInfo {
    /// Resolved docker binary path
    pub binary_path: String,
    /// Compose plugin version line
    pub compose_version: String,
}

/// Verify docker binary, daemon, and compose plugin availability.
pub async fn check_docker() -> Result<DockerInfo> {
    let binary_path = which::which("docker")
        .map(|p| p.to_string_lossy().to_string())
        .map_err(|_| Error::DockerUnavailable {
            message: "docker binary not found in PATH".into(),
        })?;
    tracing::debug!(path = %binary_path, "docker binary found");

    let daemon = Command::new("docker")
        .arg("info")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if !daemon.map(|s| s.success()).unwrap_or(false) {
        return Err(Error::DockerUnavailable {
            message: "docker daemon is not responding".into(),
        });
    }

    let compose = Command::new("docker")
        .args(["compose", "version", "--short"])
        .output()
        .await
        .map_err(|e| Error::DockerUnavailable {
            message: format!("cannot probe compose plugin: {e}"),
        })?;
    if !compose.status.success() {
        return Err(Error::DockerUnavailable {
            message: "docker compose plugin is not installed".into(),
        });
    }
    let compose_version = String::from_utf8_lossy(&compose.stdout).trim().to_string();
    tracing::debug!(version = %compose_version, "compose plugin found");

    Ok(DockerInfo {
        binary_path,
        compose_version,
    })
}
