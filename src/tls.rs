//! TLS trust helper.
//!
//! When the proxy serves HTTPS, Caddy signs certificates with an internal CA
//! whose root lives inside the proxy container. The helper copies that root
//! out, and installs it into the host trust store once per distinct cert: a
//! content hash stored next to the cert makes repeat calls no-ops.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::paths;

/// Where Caddy keeps its internal root certificate
const CADDY_ROOT_CA_PATH: &str = "/data/caddy/pki/authorities/local/root.crt";

/// Capability seam for the whole trust flow
#[async_trait]
pub trait TlsTrust: Send + Sync {
    /// Extract the proxy container's root CA and trust it on the host
    async fn trust_caddy_ca(&self, container_name: &str, workspace_dir: &Path) -> Result<()>;
}

/// The platform-specific "make the OS trust this cert" step
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Install the certificate at `cert_path` into the host trust store
    async fn install(&self, cert_path: &Path) -> Result<()>;
}

/// Production trust flow: `docker cp` extraction plus a [`TrustStore`]
#[derive(Clone)]
pub struct CaddyTlsTrust {
    store: Arc<dyn TrustStore>,
}

impl CaddyTlsTrust {
    /// Trust flow backed by the platform trust store
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(PlatformTrustStore),
        }
    }

    /// Trust flow with a custom store (tests)
    #[must_use]
    pub fn with_store(store: Arc<dyn TrustStore>) -> Self {
        Self { store }
    }
}

impl Default for CaddyTlsTrust {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TlsTrust for CaddyTlsTrust {
    async fn trust_caddy_ca(&self, container_name: &str, workspace_dir: &Path) -> Result<()> {
        let cert_path = paths::ca_cert_file(workspace_dir);
        if let Some(parent) = cert_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::tls(e.to_string()))?;
        }
        extract_ca(container_name, &cert_path).await?;
        trust_cert_file(&cert_path, workspace_dir, self.store.as_ref()).await
    }
}

/// Copy the root CA out of the proxy container.
async fn extract_ca(container_name: &str, cert_path: &Path) -> Result<()> {
    let output = Command::new("docker")
        .args([
            "cp",
            &format!("{container_name}:{CADDY_ROOT_CA_PATH}"),
            &cert_path.to_string_lossy(),
        ])
        .output()
        .await
        .map_err(|e| Error::tls(format!("failed to run docker cp: {e}")))?;
    if !output.status.success() {
        return Err(Error::tls(format!(
            "cannot extract CA from '{container_name}': {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Hash-gate and install a certificate file.
///
/// The install runs only when the on-disk hash differs from the cert's
/// current hash, which is what makes consecutive calls idempotent.
pub async fn trust_cert_file(
    cert_path: &Path,
    workspace_dir: &Path,
    store: &dyn TrustStore,
) -> Result<()> {
    let cert = tokio::fs::read(cert_path)
        .await
        .map_err(|e| Error::tls(format!("cannot read {}: {e}", cert_path.display())))?;
    let hash = cert_hash(&cert);

    let hash_path = paths::ca_cert_hash_file(workspace_dir);
    if let Ok(stored) = tokio::fs::read_to_string(&hash_path).await {
        if stored.trim() == hash {
            tracing::debug!("CA already trusted, skipping install");
            return Ok(());
        }
    }

    store.install(cert_path).await?;
    tokio::fs::write(&hash_path, &hash)
        .await
        .map_err(|e| Error::tls(format!("cannot record cert hash: {e}")))?;
    tracing::info!("CA installed into host trust store");
    Ok(())
}

/// SHA-256 of the certificate contents, hex-encoded.
#[must_use]
pub fn cert_hash(cert: &[u8]) -> String {
    hex::encode(Sha256::digest(cert))
}

/// Platform trust store operations
pub struct PlatformTrustStore;

#[async_trait]
impl TrustStore for PlatformTrustStore {
    async fn install(&self, cert_path: &Path) -> Result<()> {
        match std::env::consts::OS {
            "linux" => install_linux(cert_path).await,
            "macos" => install_macos(cert_path).await,
            os => Err(Error::tls(format!(
                "no trust-store support for platform '{os}'"
            ))),
        }
    }
}

async fn install_linux(cert_path: &Path) -> Result<()> {
    let target = Path::new("/usr/local/share/ca-certificates/lo1-caddy-root.crt");
    tokio::fs::copy(cert_path, target).await.map_err(|e| {
        Error::tls(format!(
            "cannot copy cert to {} (elevation required?): {e}",
            target.display()
        ))
    })?;
    run_trust_tool("update-ca-certificates", &[]).await
}

async fn install_macos(cert_path: &Path) -> Result<()> {
    run_trust_tool(
        "security",
        &[
            "add-trusted-cert",
            "-d",
            "-r",
            "trustRoot",
            "-k",
            "/Library/Keychains/System.keychain",
            &cert_path.to_string_lossy(),
        ],
    )
    .await
}

async fn run_trust_tool(tool: &str, args: &[&str]) -> Result<()> {
    let output = Command::new(tool)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::tls(format!("failed to run {tool}: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::tls(format!(
            "{tool} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
