//! Hosts-file block management.
//!
//! Generated proxy domains resolve to loopback through a marker-bracketed
//! block in the system hosts file. The bracketing makes edits surgical: apply
//! rewrites only the bracketed region, remove deletes exactly it. The pure
//! string algebra lives here beside the privileged writer so it tests
//! without touching the real file.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// First line of the managed block
pub const HOSTS_BLOCK_START: &str = "# lo1-start";
/// Last line of the managed block
pub const HOSTS_BLOCK_END: &str = "# lo1-end";

/// Render the managed block for the given domains. Empty input renders
/// nothing at all, markers included.
#[must_use]
pub fn generate_hosts_block(domains: &[String]) -> String {
    if domains.is_empty() {
        return String::new();
    }
    let mut block = String::from(HOSTS_BLOCK_START);
    block.push('\n');
    for domain in domains {
        block.push_str("127.0.0.1 ");
        block.push_str(domain);
        block.push('\n');
    }
    block.push_str(HOSTS_BLOCK_END);
    block.push('\n');
    block
}

/// Delete the managed block, leaving everything else untouched.
#[must_use]
pub fn remove_hosts_block(existing: &str) -> String {
    let Some(start) = existing.find(HOSTS_BLOCK_START) else {
        return existing.to_string();
    };
    let end = match existing[start..].find(HOSTS_BLOCK_END) {
        Some(rel) => {
            let mut end = start + rel + HOSTS_BLOCK_END.len();
            if existing[end..].starts_with('\n') {
                end += 1;
            }
            end
        }
        // A start marker with no end marker: drop the rest of the file
        // rather than leave a dangling half-block.
        None => existing.len(),
    };
    format!("{}{}", &existing[..start], &existing[end..])
}

/// Replace the managed block (or append one when absent).
#[must_use]
pub fn replace_hosts_block(existing: &str, block: &str) -> String {
    let without = remove_hosts_block(existing);
    if block.is_empty() {
        return without;
    }
    if without.is_empty() || without.ends_with('\n') {
        format!("{without}{block}")
    } else {
        format!("{without}\n{block}")
    }
}

/// Capability seam over the privileged hosts file
#[async_trait]
pub trait HostsWriter: Send + Sync {
    /// Install or refresh the managed block
    async fn apply(&self, block: &str) -> Result<()>;
    /// Delete the managed block
    async fn remove(&self) -> Result<()>;
}

/// Production writer editing the system hosts file. Requires elevation;
/// permission failures surface as [`Error::Hosts`].
#[derive(Debug, Clone)]
pub struct SystemHostsWriter {
    path: PathBuf,
}

impl SystemHostsWriter {
    /// Writer for the platform's hosts file
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: default_hosts_path(),
        }
    }

    /// Writer for an explicit path (tests, containers)
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn rewrite(&self, f: impl FnOnce(&str) -> String) -> Result<()> {
        let existing = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::hosts(format!("cannot read {}: {e}", self.path.display())))?;
        let updated = f(&existing);
        if updated == existing {
            return Ok(());
        }
        tokio::fs::write(&self.path, updated)
            .await
            .map_err(|e| {
                Error::hosts(format!(
                    "cannot write {}: {e} (elevation required?)",
                    self.path.display()
                ))
            })
    }
}

impl Default for SystemHostsWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostsWriter for SystemHostsWriter {
    async fn apply(&self, block: &str) -> Result<()> {
        tracing::info!(path = %self.path.display(), "updating hosts block");
        self.rewrite(|existing| replace_hosts_block(existing, block))
            .await
    }

    async fn remove(&self) -> Result<()> {
        tracing::info!(path = %self.path.display(), "removing hosts block");
        self.rewrite(remove_hosts_block).await
    }
}

fn default_hosts_path() -> PathBuf {
    #[cfg(windows)]
    {
        PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts")
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/etc/hosts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "127.0.0.1 localhost\n::1 localhost\n";

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_empty_domains_render_nothing() {
        assert_eq!(generate_hosts_block(&[]), "");
    }

    #[test]
    fn test_block_shape() {
        let block = generate_hosts_block(&domains(&["api.shop.local", "db.shop.local"]));
        assert_eq!(
            block,
            "# lo1-start\n127.0.0.1 api.shop.local\n127.0.0.1 db.shop.local\n# lo1-end\n"
        );
    }

    #[test]
    fn test_remove_after_replace_is_identity() {
        let block = generate_hosts_block(&domains(&["api.shop.local"]));
        let applied = replace_hosts_block(BASE, &block);
        assert_eq!(remove_hosts_block(&applied), BASE);
    }

    #[test]
    fn test_replace_touches_only_bracketed_region() {
        let first = generate_hosts_block(&domains(&["old.shop.local"]));
        let applied = replace_hosts_block(BASE, &first);
        let trailing = format!("{applied}# user note\n");

        // The user note sits after the block; replacing must keep it.
        let second = generate_hosts_block(&domains(&["new.shop.local"]));
        let updated = replace_hosts_block(&trailing, &second);
        assert!(updated.contains("# user note"));
        assert!(updated.contains("new.shop.local"));
        assert!(!updated.contains("old.shop.local"));
        assert_eq!(updated.matches(HOSTS_BLOCK_START).count(), 1);
    }

    #[test]
    fn test_replace_with_empty_block_removes() {
        let block = generate_hosts_block(&domains(&["api.shop.local"]));
        let applied = replace_hosts_block(BASE, &block);
        assert_eq!(replace_hosts_block(&applied, ""), BASE);
    }

    #[test]
    fn test_remove_without_block_is_identity() {
        assert_eq!(remove_hosts_block(BASE), BASE);
    }

    #[tokio::test]
    async fn test_system_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        tokio::fs::write(&path, BASE).await.unwrap();

        let writer = SystemHostsWriter::at(&path);
        let block = generate_hosts_block(&domains(&["api.shop.local"]));
        writer.apply(&block).await.unwrap();
        let applied = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(applied.contains("127.0.0.1 api.shop.local"));

        writer.remove().await.unwrap();
        let removed = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(removed, BASE);
    }

    #[tokio::test]
    async fn test_missing_file_is_hosts_error() {
        let writer = SystemHostsWriter::at("/definitely/not/here/hosts");
        let err = writer.apply("# block").await.unwrap_err();
        assert!(matches!(err, Error::Hosts { .. }));
    }
}
