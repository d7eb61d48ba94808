//! Well-known paths under the workspace `.lo1/` directory.

use std::path::{Path, PathBuf};

/// Directory owned by the orchestrator for the duration of a run
pub const LO1_DIR: &str = ".lo1";

/// `<workspace>/.lo1`
#[must_use]
pub fn lo1_dir(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(LO1_DIR)
}

/// `<workspace>/.lo1/state.json`
#[must_use]
pub fn state_file(workspace_dir: &Path) -> PathBuf {
    lo1_dir(workspace_dir).join("state.json")
}

/// `<workspace>/.lo1/compose.generated.yaml`
#[must_use]
pub fn generated_compose_file(workspace_dir: &Path) -> PathBuf {
    lo1_dir(workspace_dir).join("compose.generated.yaml")
}

/// `<workspace>/.lo1/Caddyfile`
#[must_use]
pub fn caddyfile(workspace_dir: &Path) -> PathBuf {
    lo1_dir(workspace_dir).join("Caddyfile")
}

/// `<workspace>/.lo1/logs`
#[must_use]
pub fn logs_dir(workspace_dir: &Path) -> PathBuf {
    lo1_dir(workspace_dir).join("logs")
}

/// `<workspace>/.lo1/caddy-root.crt`
#[must_use]
pub fn ca_cert_file(workspace_dir: &Path) -> PathBuf {
    lo1_dir(workspace_dir).join("caddy-root.crt")
}

/// `<workspace>/.lo1/caddy-root.crt.sha256`
#[must_use]
pub fn ca_cert_hash_file(workspace_dir: &Path) -> PathBuf {
    lo1_dir(workspace_dir).join("caddy-root.crt.sha256")
}

/// `<workspace>/.lo1/compose` — preprocessed copies of per-service files
#[must_use]
pub fn preprocessed_compose_dir(workspace_dir: &Path) -> PathBuf {
    lo1_dir(workspace_dir).join("compose")
}
