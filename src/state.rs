//! Workspace run-state persistence.
//!
//! `state.json` is the crash-recovery record of the current run: which
//! project was brought up, from which files, and what supervises each
//! service. It is written after infrastructure comes up (empty services map),
//! updated once the service layers are running, and removed on clean stop.
//! A second CLI invocation (`lo1 down` from another terminal, or a later
//! `up` finding a stale run) rebuilds handles from it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compose::ComposeOptions;
use crate::error::{Error, Result};
use crate::paths;
use crate::runner::RunnerKind;

/// Persisted supervisory facts for one service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceState {
    /// Which runner supervises the service
    pub runner: RunnerKind,
    /// Pid for process runners
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Container name or id for container runners
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// The persisted state of one running workspace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    /// Workspace name from the manifest
    pub workspace_name: String,
    /// Compose project name, `lo1-<workspace>`
    pub project_name: String,
    /// Compose files the project was brought up with
    pub file_args: Vec<PathBuf>,
    /// Workspace root directory
    pub workspace_dir: PathBuf,
    /// Per-service supervisory facts
    pub services: BTreeMap<String, ServiceState>,
}

impl WorkspaceState {
    /// Baseline state written right after infrastructure comes up
    #[must_use]
    pub fn baseline(
        workspace_name: impl Into<String>,
        file_args: Vec<PathBuf>,
        workspace_dir: PathBuf,
    ) -> Self {
        let workspace_name = workspace_name.into();
        Self {
            project_name: format!("lo1-{workspace_name}"),
            workspace_name,
            file_args,
            workspace_dir,
            services: BTreeMap::new(),
        }
    }

    /// Compose options equivalent to the recorded project
    #[must_use]
    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            project_name: self.project_name.clone(),
            file_args: self.file_args.clone(),
            cwd: self.workspace_dir.clone(),
        }
    }

    /// Write the state file, creating `.lo1/` if needed
    pub async fn save(&self, workspace_dir: &Path) -> Result<()> {
        let path = paths::state_file(workspace_dir);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::state(&path, e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| Error::state(&path, e.to_string()))?;
        tracing::debug!(path = %path.display(), "state saved");
        Ok(())
    }

    /// Read the state file; `None` when no run is recorded
    pub async fn load(workspace_dir: &Path) -> Result<Option<Self>> {
        let path = paths::state_file(workspace_dir);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::state(&path, e.to_string())),
        };
        let state =
            serde_json::from_str(&raw).map_err(|e| Error::state(&path, e.to_string()))?;
        Ok(Some(state))
    }

    /// Remove the state file; missing is fine
    pub async fn remove(workspace_dir: &Path) -> Result<()> {
        let path = paths::state_file(workspace_dir);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::state(&path, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkspaceState {
        let mut state = WorkspaceState::baseline(
            "shop",
            vec![PathBuf::from(".lo1/compose.generated.yaml")],
            PathBuf::from("/tmp/shop"),
        );
        state.services.insert(
            "api".into(),
            ServiceState {
                runner: RunnerKind::Process,
                pid: Some(4242),
                container_id: None,
            },
        );
        state.services.insert(
            "cache".into(),
            ServiceState {
                runner: RunnerKind::Container,
                pid: None,
                container_id: Some("lo1-shop-cache".into()),
            },
        );
        state
    }

    #[test]
    fn test_baseline_derives_project_name() {
        let state = WorkspaceState::baseline("shop", vec![], PathBuf::from("."));
        assert_eq!(state.project_name, "lo1-shop");
        assert!(state.services.is_empty());
    }

    #[tokio::test]
    async fn test_save_load_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample();
        state.save(dir.path()).await.unwrap();

        let loaded = WorkspaceState::load(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded, state);

        WorkspaceState::remove(dir.path()).await.unwrap();
        assert!(WorkspaceState::load(dir.path()).await.unwrap().is_none());
        // Removing again is still fine.
        WorkspaceState::remove(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WorkspaceState::load(dir.path()).await.unwrap().is_none());
    }

    #[test]
    fn test_serialized_shape_is_camel_case() {
        let json = serde_json::to_string_pretty(&sample()).unwrap();
        assert!(json.contains("\"workspaceName\""));
        assert!(json.contains("\"projectName\": \"lo1-shop\""));
        assert!(json.contains("\"containerId\""));
        assert!(json.contains("\"runner\": \"process\""));
    }

    #[test]
    fn test_compose_options_match_recorded_project() {
        let options = sample().compose_options();
        assert_eq!(options.project_name, "lo1-shop");
        assert_eq!(options.cwd, PathBuf::from("/tmp/shop"));
        assert_eq!(options.file_args.len(), 1);
    }
}
