//! Property tests for the dependency layering invariants.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use lo1::config::{ServiceConfig, ServiceMode, WorkspaceConfig};
use lo1::{build_dag, Error};

fn service(deps: Vec<String>) -> ServiceConfig {
    ServiceConfig {
        service_type: "service".into(),
        path: "./svc".into(),
        port: None,
        host_port: None,
        mode: ServiceMode::Dev,
        command: Some("true".into()),
        container_image: None,
        compose: None,
        env: BTreeMap::new(),
        proxy: None,
        hooks: None,
        depends_on: deps,
        init_task: false,
        readiness_probe: None,
    }
}

fn workspace(services: BTreeMap<String, ServiceConfig>) -> WorkspaceConfig {
    WorkspaceConfig {
        version: "1".into(),
        name: "prop".into(),
        plugins: BTreeMap::new(),
        repositories: Vec::new(),
        proxy: None,
        extra_compose: None,
        hooks: None,
        services,
    }
}

/// Dependency lists where service `i` may only depend on services `< i`,
/// which makes the graph acyclic by construction.
fn acyclic_deps() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| {
                proptest::collection::btree_set(0..i.max(1), 0..=i.min(4)).prop_map(
                    move |set| {
                        if i == 0 {
                            Vec::new()
                        } else {
                            set.into_iter().collect()
                        }
                    },
                )
            })
            .collect::<Vec<_>>()
    })
}

proptest! {
    #[test]
    fn layers_cover_all_services_and_respect_dependencies(deps in acyclic_deps()) {
        let mut services = BTreeMap::new();
        for (i, dep_indices) in deps.iter().enumerate() {
            let dep_names = dep_indices.iter().map(|j| format!("svc{j:02}")).collect();
            services.insert(format!("svc{i:02}"), service(dep_names));
        }
        let config = workspace(services);

        let plan = build_dag(&config).unwrap();

        // Flat union of the layers equals the declared service set.
        let planned: BTreeSet<&str> = plan.service_names().collect();
        let declared: BTreeSet<&str> = config.services.keys().map(String::as_str).collect();
        prop_assert_eq!(planned, declared);
        prop_assert_eq!(plan.service_count, config.services.len());

        // Every dependency sits in a strictly earlier layer.
        let mut layer_of = BTreeMap::new();
        for (index, layer) in plan.layers.iter().enumerate() {
            for name in layer {
                layer_of.insert(name.as_str(), index);
            }
        }
        for (name, svc) in &config.services {
            for dep in &svc.depends_on {
                prop_assert!(layer_of[dep.as_str()] < layer_of[name.as_str()]);
            }
        }

        // Deterministic ordering inside each layer.
        for layer in &plan.layers {
            let mut sorted = layer.clone();
            sorted.sort();
            prop_assert_eq!(&sorted, layer);
        }
    }

    #[test]
    fn chains_with_a_back_edge_are_rejected(len in 2usize..10) {
        let mut services = BTreeMap::new();
        for i in 0..len {
            let deps = if i == 0 {
                // Close the loop: the first service depends on the last.
                vec![format!("svc{:02}", len - 1)]
            } else {
                vec![format!("svc{:02}", i - 1)]
            };
            services.insert(format!("svc{i:02}"), service(deps));
        }
        let config = workspace(services);

        match build_dag(&config) {
            Err(Error::CycleDetected { path }) => {
                prop_assert!(path.len() >= 2);
                // The diagnostic names every service on the cycle.
                for i in 0..len {
                    let name = format!("svc{i:02}");
                    prop_assert!(path.contains(&name), "missing {} in {:?}", name, path);
                }
            }
            other => prop_assert!(false, "expected cycle error, got {:?}", other.map(|p| p.layers)),
        }
    }
}
