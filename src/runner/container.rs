//! Single-container runner.
//!
//! Used for plugin-provided container configurations: one `docker run -d`
//! per service, a `docker logs -f` follower feeding the event bus, and a
//! `docker stop` / `docker rm` pair on shutdown, both tolerant of the
//! container already being gone.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::events::{EventSender, StreamKind};
use crate::runner::{docker_output, DEFAULT_CONTAINER_STOP_TIMEOUT};
use crate::stream::forward_lines;

/// Container launch parameters, typically supplied by a plugin
#[derive(Debug, Clone, Default)]
pub struct ContainerRunConfig {
    /// Image reference
    pub image: String,
    /// Command override; image default when empty
    pub command: Vec<String>,
    /// Base environment
    pub env: BTreeMap<String, String>,
    /// Bind mounts, `host:container` form
    pub binds: Vec<String>,
    /// Working directory inside the container
    pub working_dir: Option<String>,
    /// Published ports, `(host, container)` pairs
    pub ports: Vec<(u16, u16)>,
}

/// Everything needed to launch one service container
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Workspace the container belongs to
    pub workspace_name: String,
    /// Service name
    pub service_name: String,
    /// Container name, `lo1-<workspace>-<service>`
    pub container_name: String,
    /// Workspace network to attach to
    pub network_name: String,
    /// Launch parameters
    pub config: ContainerRunConfig,
    /// Extra environment layered over the config's own
    pub env: BTreeMap<String, String>,
}

/// Supervisory state for one running container
#[derive(Debug)]
pub struct ContainerHandle {
    service_name: String,
    container_name: String,
    container_id: String,
    running: Arc<AtomicBool>,
    log_follower: Mutex<Option<Child>>,
}

/// Launch a container and start following its logs.
pub async fn start_container(
    options: ContainerOptions,
    events: &EventSender,
) -> Result<ContainerHandle> {
    let args = run_args(&options);
    let output = docker_output(&args).await?;
    if !output.status.success() {
        return Err(Error::container_runner(
            &options.service_name,
            format!(
                "docker run failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if container_id.is_empty() {
        return Err(Error::container_runner(
            &options.service_name,
            "docker run produced no container id",
        ));
    }

    let follower = spawn_log_follower(&container_id, &options.service_name, events)?;

    tracing::info!(
        service = %options.service_name,
        container = %options.container_name,
        id = %container_id,
        "container started"
    );
    Ok(ContainerHandle {
        service_name: options.service_name,
        container_name: options.container_name,
        container_id,
        running: Arc::new(AtomicBool::new(true)),
        log_follower: Mutex::new(Some(follower)),
    })
}

/// Build the `docker run` argument vector for the options.
#[must_use]
pub fn run_args(options: &ContainerOptions) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".into(),
        "--name".into(),
        options.container_name.clone(),
        "--network".into(),
        options.network_name.clone(),
    ];
    for bind in &options.config.binds {
        args.push("-v".into());
        args.push(bind.clone());
    }
    if let Some(dir) = &options.config.working_dir {
        args.push("-w".into());
        args.push(dir.clone());
    }
    for (host, container) in &options.config.ports {
        args.push("-p".into());
        args.push(format!("{host}:{container}"));
    }
    // Caller env wins over the config's baseline.
    let mut env = options.config.env.clone();
    env.extend(options.env.clone());
    for (key, value) in &env {
        args.push("-e".into());
        args.push(format!("{key}={value}"));
    }
    args.push(options.config.image.clone());
    args.extend(options.config.command.iter().cloned());
    args
}

fn spawn_log_follower(
    container_id: &str,
    service_name: &str,
    events: &EventSender,
) -> Result<Child> {
    let mut child = Command::new("docker")
        .args(["logs", "-f", container_id])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            Error::container_runner(service_name, format!("failed to follow logs: {e}"))
        })?;
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, service_name, StreamKind::Stdout, events.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, service_name, StreamKind::Stderr, events.clone());
    }
    Ok(child)
}

impl ContainerHandle {
    /// Container id reported by `docker run`
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Container name
    #[must_use]
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Whether the container is still believed to be running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop and remove the container, then kill the log follower.
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(DEFAULT_CONTAINER_STOP_TIMEOUT);
        tracing::debug!(service = %self.service_name, container = %self.container_name, "stopping container");
        stop_and_remove(&self.container_name, timeout).await;
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut follower) = self.log_follower.lock().await.take() {
            let _ = follower.kill().await;
        }
        Ok(())
    }
}

/// `docker stop -t <secs>` then `docker rm`, each tolerant of the container
/// already being stopped or removed.
pub(crate) async fn stop_and_remove(name_or_id: &str, timeout: Duration) {
    let secs = timeout.as_millis().div_ceil(1000).to_string();
    let stop = ["stop".to_string(), "-t".into(), secs, name_or_id.to_string()];
    if let Ok(output) = docker_output(&stop).await {
        if !output.status.success() {
            tracing::debug!(
                container = name_or_id,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "docker stop reported failure"
            );
        }
    }
    let rm = ["rm".to_string(), name_or_id.to_string()];
    if let Ok(output) = docker_output(&rm).await {
        if !output.status.success() {
            tracing::debug!(
                container = name_or_id,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "docker rm reported failure"
            );
        }
    }
}
