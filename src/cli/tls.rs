//! The `tls-setup` command: trust the proxy CA.

use std::path::Path;

use crate::config::WorkspaceConfig;
use crate::error::{Error, Result};
use crate::orchestrator::MANIFEST_FILE;
use crate::tls::{CaddyTlsTrust, TlsTrust};

/// Run `lo1 tls-setup`.
pub async fn run(workspace_dir: &Path) -> Result<()> {
    let config = WorkspaceConfig::load(&workspace_dir.join(MANIFEST_FILE)).await?;
    if !config.tls_enabled() {
        return Err(Error::tls(
            "TLS is not enabled in this workspace's proxy config".to_string(),
        ));
    }
    CaddyTlsTrust::new()
        .trust_caddy_ca(&config.proxy_service_name(), workspace_dir)
        .await?;
    println!("proxy CA trusted");
    Ok(())
}
