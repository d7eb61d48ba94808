//! Service filter resolution for `up --services`.

use std::collections::{BTreeSet, VecDeque};

use crate::config::WorkspaceConfig;
use crate::error::{Error, Result};

/// Compute the transitive dependency closure of the requested services.
///
/// BFS over `dependsOn` starting from `requested`. The result is the least
/// set containing the request and closed under dependencies; requesting every
/// service is the identity. Unknown names fail with [`Error::Filter`].
pub fn resolve_service_filter(
    requested: &[String],
    config: &WorkspaceConfig,
) -> Result<BTreeSet<String>> {
    let mut closure = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for name in requested {
        if !config.services.contains_key(name) {
            return Err(Error::Filter {
                service: name.clone(),
            });
        }
        if closure.insert(name.clone()) {
            queue.push_back(name.as_str());
        }
    }

    while let Some(name) = queue.pop_front() {
        // Validated at load time for all known services; unknown deps are the
        // DAG builder's error to raise, not the filter's.
        if let Some(service) = config.services.get(name) {
            for dep in &service.depends_on {
                if closure.insert(dep.clone()) {
                    queue.push_back(dep.as_str());
                }
            }
        }
    }

    Ok(closure)
}
