//! The `hosts` command: apply or remove the proxy domain block.

use std::path::Path;

use crate::config::WorkspaceConfig;
use crate::endpoints::build_endpoint_registry;
use crate::error::{Error, Result};
use crate::hosts::{generate_hosts_block, HostsWriter, SystemHostsWriter};
use crate::orchestrator::MANIFEST_FILE;
use crate::proxygen::generate_proxy_config;

/// Run `lo1 hosts [--apply|--remove]`.
pub async fn run(workspace_dir: &Path, apply: bool, remove: bool) -> Result<()> {
    if apply == remove {
        return Err(Error::hosts(
            "pass exactly one of --apply or --remove".to_string(),
        ));
    }
    let writer = SystemHostsWriter::new();
    if remove {
        writer.remove().await?;
        println!("hosts block removed");
        return Ok(());
    }

    let config = WorkspaceConfig::load(&workspace_dir.join(MANIFEST_FILE)).await?;
    let registry = build_endpoint_registry(&config);
    let proxy = generate_proxy_config(&config, &registry);
    let block = generate_hosts_block(&proxy.domains);
    if block.is_empty() {
        println!("no proxy domains to apply (is the proxy enabled?)");
        return Ok(());
    }
    writer.apply(&block).await?;
    println!("hosts block applied ({} domains)", proxy.domains.len());
    Ok(())
}
