//! Dependency graph construction and layered scheduling.
//!
//! Services are validated, checked for cycles, and arranged into execution
//! layers via Kahn's algorithm. Members of a layer depend only on services in
//! strictly earlier layers, so a layer can be started in parallel. Layers are
//! sorted lexicographically for deterministic logs and tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::WorkspaceConfig;
use crate::error::{Error, Result};

/// Layered execution plan for a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Parallel start layers, in order
    pub layers: Vec<Vec<String>>,
    /// Total number of services planned
    pub service_count: usize,
}

impl ExecutionPlan {
    /// Iterate all planned service names in start order
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().flatten().map(String::as_str)
    }
}

/// Build the layered execution plan for a workspace.
///
/// Fails with [`Error::UnknownDependency`] when a `dependsOn` entry names a
/// service that does not exist, and with [`Error::CycleDetected`] (carrying
/// the full reconstructed path) when the graph is cyclic.
pub fn build_dag(config: &WorkspaceConfig) -> Result<ExecutionPlan> {
    validate_references(config)?;
    detect_cycles(config)?;
    layer(config)
}

fn validate_references(config: &WorkspaceConfig) -> Result<()> {
    for (name, service) in &config.services {
        for dep in &service.depends_on {
            if !config.services.contains_key(dep) {
                return Err(Error::UnknownDependency {
                    service: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// DFS with three-color marking. Runs before the topological sort purely for
/// diagnostic quality: on a back edge the cycle path is reconstructed through
/// parent pointers so the error names every node on it.
fn detect_cycles(config: &WorkspaceConfig) -> Result<()> {
    let mut colors: BTreeMap<&str, Color> = config
        .services
        .keys()
        .map(|name| (name.as_str(), Color::White))
        .collect();
    let mut parents: BTreeMap<&str, &str> = BTreeMap::new();

    for start in config.services.keys() {
        if colors[start.as_str()] != Color::White {
            continue;
        }
        // Iterative DFS; an Enter/Exit marker pair stands in for recursion.
        let mut stack = vec![(start.as_str(), false)];
        while let Some((node, exiting)) = stack.pop() {
            if exiting {
                colors.insert(node, Color::Black);
                continue;
            }
            if colors[node] != Color::White {
                continue;
            }
            colors.insert(node, Color::Gray);
            stack.push((node, true));
            for dep in &config.services[node].depends_on {
                match colors[dep.as_str()] {
                    Color::White => {
                        parents.insert(dep.as_str(), node);
                        stack.push((dep.as_str(), false));
                    }
                    Color::Gray => {
                        return Err(Error::CycleDetected {
                            path: reconstruct_cycle(&parents, node, dep),
                        });
                    }
                    Color::Black => {}
                }
            }
        }
    }
    Ok(())
}

fn reconstruct_cycle(parents: &BTreeMap<&str, &str>, from: &str, back_to: &str) -> Vec<String> {
    let mut path = vec![from.to_string()];
    let mut cursor = from;
    while cursor != back_to {
        match parents.get(cursor) {
            Some(parent) => {
                path.push((*parent).to_string());
                cursor = parent;
            }
            None => break,
        }
    }
    path.reverse();
    path.push(back_to.to_string());
    path
}

fn layer(config: &WorkspaceConfig) -> Result<ExecutionPlan> {
    let mut in_degree: BTreeMap<&str, usize> = config
        .services
        .keys()
        .map(|name| (name.as_str(), 0))
        .collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, service) in &config.services {
        for dep in &service.depends_on {
            *in_degree.get_mut(name.as_str()).expect("known service") += 1;
            dependents.entry(dep.as_str()).or_default().push(name);
        }
    }

    let mut current: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    current.sort_unstable();

    let mut layers = Vec::new();
    let mut peeled = 0usize;
    while !current.is_empty() {
        peeled += current.len();
        let mut next = VecDeque::new();
        for node in &current {
            for dependent in dependents.get(node).map_or(&[][..], Vec::as_slice) {
                let degree = in_degree.get_mut(dependent).expect("known service");
                *degree -= 1;
                if *degree == 0 {
                    next.push_back(*dependent);
                }
            }
        }
        layers.push(current.iter().map(ToString::to_string).collect());
        current = next.into_iter().collect();
        current.sort_unstable();
    }

    // Cycles were caught above; a leftover node here means the bookkeeping
    // broke, not the input.
    if peeled != config.services.len() {
        let stuck: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(name, _)| *name)
            .collect();
        return Err(Error::orchestrator(format!(
            "dependency layering left unpeeled services: {stuck:?}"
        )));
    }

    Ok(ExecutionPlan {
        layers,
        service_count: peeled,
    })
}
