//! Generated compose document and project file set.
//!
//! The generator turns the manifest (plus plugin contributions) into one
//! compose document under `.lo1/`, collects the full `-f` file list for the
//! project, preprocesses per-service compose files so their relative paths
//! survive the project-directory change, and partitions compose services
//! into the infrastructure and application phases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::config::{ServiceMode, WorkspaceConfig};
use crate::error::{Error, Result};
use crate::paths;
use crate::plugin::ComposeContribution;

/// Everything the orchestrator needs to drive the compose phases
#[derive(Debug, Clone, Default)]
pub struct ComposeGeneration {
    /// All compose files, in `-f` order (generated file first)
    pub file_args: Vec<PathBuf>,
    /// Infrastructure-phase services: proxy, plugin contributions, extras
    pub infra_services: Vec<String>,
    /// Application-phase services: container-mode manifest services
    pub app_services: Vec<String>,
    /// Services that must run to completion before dependents start
    pub init_tasks: Vec<String>,
}

impl ComposeGeneration {
    /// Init tasks restricted to the infrastructure phase
    #[must_use]
    pub fn infra_init_tasks(&self) -> Vec<String> {
        self.init_tasks
            .iter()
            .filter(|t| self.infra_services.contains(t))
            .cloned()
            .collect()
    }

    /// Init tasks restricted to the application phase
    #[must_use]
    pub fn app_init_tasks(&self) -> Vec<String> {
        self.init_tasks
            .iter()
            .filter(|t| self.app_services.contains(t))
            .cloned()
            .collect()
    }
}

/// Build the generated compose document as a YAML value.
///
/// Pure; writing and path resolution happen in [`generate`].
pub fn build_compose_document(
    config: &WorkspaceConfig,
    contributions: &ComposeContribution,
    workspace_dir: &Path,
) -> Result<Value> {
    let network = config.network_name();
    let mut services = Mapping::new();

    for (name, service) in &config.services {
        if service.mode != ServiceMode::Container || service.compose.is_some() {
            continue;
        }
        let Some(image) = &service.container_image else {
            continue;
        };
        let mut def = Mapping::new();
        def.insert("image".into(), image.clone().into());
        def.insert("networks".into(), vec![Value::from(network.clone())].into());
        if let Some(port) = service.port {
            let host_port = service.effective_host_port().unwrap_or(port);
            def.insert(
                "ports".into(),
                vec![Value::from(format!("{host_port}:{port}"))].into(),
            );
        }
        if !service.env.is_empty() {
            def.insert("environment".into(), env_mapping(&service.env));
        }
        add_host_gateway(&mut def);
        services.insert(name.clone().into(), Value::Mapping(def));
    }

    for (name, definition) in &contributions.services {
        let mut def = definition.clone();
        let needs_network = def.get("networks").is_none();
        let needs_gateway = def.get("extra_hosts").is_none();
        let Some(mapping) = def.as_mapping_mut() else {
            return Err(Error::compose(format!(
                "plugin contribution for '{name}' is not a mapping"
            )));
        };
        if needs_network {
            mapping.insert("networks".into(), vec![Value::from(network.clone())].into());
        }
        if needs_gateway {
            add_host_gateway(mapping);
        }
        services.insert(name.clone().into(), def);
    }

    if config.proxy.as_ref().is_some_and(|p| p.enabled) {
        let proxy_name = config.proxy_service_name();
        services.insert(proxy_name.into(), proxy_service(config, workspace_dir));
    }

    let mut networks = Mapping::new();
    let mut bridge = Mapping::new();
    bridge.insert("driver".into(), "bridge".into());
    networks.insert(network.into(), Value::Mapping(bridge));

    let mut document = Mapping::new();
    document.insert("name".into(), config.project_name().into());
    document.insert("networks".into(), Value::Mapping(networks));
    document.insert("services".into(), Value::Mapping(services));
    Ok(Value::Mapping(document))
}

fn env_mapping(env: &BTreeMap<String, String>) -> Value {
    let mut mapping = Mapping::new();
    for (key, value) in env {
        mapping.insert(key.clone().into(), value.clone().into());
    }
    Value::Mapping(mapping)
}

fn proxy_service(config: &WorkspaceConfig, workspace_dir: &Path) -> Value {
    let proxy = config.proxy.as_ref();
    let mut def = Mapping::new();
    def.insert("image".into(), "caddy:2-alpine".into());
    def.insert(
        "networks".into(),
        vec![Value::from(config.network_name())].into(),
    );

    let http_port = proxy.and_then(|p| p.port).unwrap_or(80);
    let mut ports = vec![Value::from(format!("{http_port}:80"))];
    if config.tls_enabled() {
        let tls_port = proxy
            .and_then(|p| p.tls.as_ref())
            .and_then(|t| t.port)
            .unwrap_or(443);
        ports.push(Value::from(format!("{tls_port}:443")));
    }
    def.insert("ports".into(), ports.into());

    let caddyfile = paths::caddyfile(workspace_dir);
    def.insert(
        "volumes".into(),
        vec![Value::from(format!(
            "{}:/etc/caddy/Caddyfile",
            caddyfile.display()
        ))]
        .into(),
    );
    add_host_gateway(&mut def);
    Value::Mapping(def)
}

/// Containers reach host processes through `host.docker.internal`; on Linux
/// that name only exists with an explicit host-gateway mapping.
fn add_host_gateway(def: &mut Mapping) {
    if cfg!(target_os = "linux") {
        def.insert(
            "extra_hosts".into(),
            vec![Value::from("host.docker.internal:host-gateway")].into(),
        );
    }
}

/// Generate the compose project: write the document, preprocess per-service
/// files, read extra-compose service names, and partition the phases.
pub async fn generate(
    config: &WorkspaceConfig,
    contributions: &ComposeContribution,
    workspace_dir: &Path,
) -> Result<ComposeGeneration> {
    let document = build_compose_document(config, contributions, workspace_dir)?;
    let compose_path = paths::generated_compose_file(workspace_dir);
    if let Some(parent) = compose_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&compose_path, serde_yaml::to_string(&document)?).await?;
    tracing::debug!(path = %compose_path.display(), "compose document written");

    let mut file_args = vec![compose_path];
    let mut app_services: Vec<String> = Vec::new();
    let mut infra_services: Vec<String> = Vec::new();
    let mut init_tasks: Vec<String> = Vec::new();

    for (name, service) in &config.services {
        if service.mode != ServiceMode::Container {
            continue;
        }
        if let Some(compose_file) = &service.compose {
            let source = workspace_dir.join(compose_file);
            let preprocessed = preprocess_service_compose(name, &source, workspace_dir).await?;
            app_services.extend(read_service_names(&preprocessed.document));
            file_args.push(preprocessed.path);
        } else if service.container_image.is_some() {
            app_services.push(name.clone());
        }
        if service.init_task {
            init_tasks.push(name.clone());
        }
    }

    infra_services.extend(contributions.services.keys().cloned());
    if config.proxy.as_ref().is_some_and(|p| p.enabled) {
        infra_services.push(config.proxy_service_name());
    }

    if let Some(extra) = &config.extra_compose {
        let extra_path = workspace_dir.join(extra.file());
        let raw = tokio::fs::read_to_string(&extra_path).await.map_err(|e| {
            Error::compose(format!(
                "cannot read extraCompose file {}: {e}",
                extra_path.display()
            ))
        })?;
        let document: Value = serde_yaml::from_str(&raw)?;
        infra_services.extend(read_service_names(&document));
        init_tasks.extend(extra.init_task_services().iter().cloned());
        file_args.push(extra_path);
    }

    infra_services.sort();
    infra_services.dedup();
    app_services.sort();
    app_services.dedup();

    Ok(ComposeGeneration {
        file_args,
        infra_services,
        app_services,
        init_tasks,
    })
}

struct Preprocessed {
    path: PathBuf,
    document: Value,
}

/// Copy a per-service compose file under `.lo1/compose/`, rewriting relative
/// `build` contexts and bind-mount sources to absolute paths anchored at the
/// original file's directory.
async fn preprocess_service_compose(
    service_name: &str,
    source: &Path,
    workspace_dir: &Path,
) -> Result<Preprocessed> {
    let raw = tokio::fs::read_to_string(source).await.map_err(|e| {
        Error::compose(format!(
            "cannot read compose file {} for service '{service_name}': {e}",
            source.display()
        ))
    })?;
    let mut document: Value = serde_yaml::from_str(&raw)?;
    let base = source.parent().unwrap_or(workspace_dir);
    resolve_relative_paths(&mut document, base);

    let out_dir = paths::preprocessed_compose_dir(workspace_dir);
    tokio::fs::create_dir_all(&out_dir).await?;
    let path = out_dir.join(format!("{service_name}.yaml"));
    tokio::fs::write(&path, serde_yaml::to_string(&document)?).await?;
    Ok(Preprocessed { path, document })
}

fn resolve_relative_paths(document: &mut Value, base: &Path) {
    let Some(services) = document
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
    else {
        return;
    };
    for (_, def) in services.iter_mut() {
        if let Some(build) = def.get_mut("build") {
            resolve_build(build, base);
        }
        if let Some(volumes) = def.get_mut("volumes").and_then(Value::as_sequence_mut) {
            for volume in volumes.iter_mut() {
                if let Some(bind) = volume.as_str() {
                    if let Some(resolved) = resolve_bind(bind, base) {
                        *volume = resolved.into();
                    }
                }
            }
        }
    }
}

fn resolve_build(build: &mut Value, base: &Path) {
    if let Value::String(context) = build {
        if is_relative(context) {
            *context = base.join(&*context).to_string_lossy().to_string();
        }
        return;
    }
    // Long form: `build: {context: ..., dockerfile: ...}`
    if let Some(Value::String(context)) = build.get_mut("context") {
        if is_relative(context) {
            *context = base.join(&*context).to_string_lossy().to_string();
        }
    }
}

/// Resolve the host side of a short-form bind mount when it is a relative
/// path. Named volumes (no separator, or no path-ish prefix) pass through.
fn resolve_bind(spec: &str, base: &Path) -> Option<String> {
    let (host, rest) = spec.split_once(':')?;
    if !is_relative(host) {
        return None;
    }
    Some(format!(
        "{}:{rest}",
        base.join(host).to_string_lossy()
    ))
}

fn is_relative(path: &str) -> bool {
    path.starts_with("./") || path.starts_with("../")
}

fn read_service_names(document: &Value) -> Vec<String> {
    document
        .get("services")
        .and_then(Value::as_mapping)
        .map(|services| {
            services
                .keys()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceConfig;

    fn config() -> WorkspaceConfig {
        WorkspaceConfig::parse(
            r#"
version: "1"
name: shop
proxy:
  enabled: true
  tls:
    enabled: true
    port: 8443
services:
  db:
    type: service
    path: ./db
    mode: container
    containerImage: postgres:16
    port: 5432
    env:
      POSTGRES_PASSWORD: dev
  api:
    type: service
    path: ./api
    command: run
    port: 3000
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_document_shape() {
        let document =
            build_compose_document(&config(), &ComposeContribution::default(), Path::new("/ws"))
                .unwrap();
        assert_eq!(document["name"], Value::from("lo1-shop"));
        assert!(document["networks"]["lo1-shop-network"].is_mapping());

        let db = &document["services"]["db"];
        assert_eq!(db["image"], Value::from("postgres:16"));
        assert_eq!(db["ports"][0], Value::from("5432:5432"));
        assert_eq!(db["environment"]["POSTGRES_PASSWORD"], Value::from("dev"));
        assert_eq!(db["networks"][0], Value::from("lo1-shop-network"));

        // dev-mode services never enter the document
        assert!(document["services"].get("api").is_none());
    }

    #[test]
    fn test_proxy_service() {
        let document =
            build_compose_document(&config(), &ComposeContribution::default(), Path::new("/ws"))
                .unwrap();
        let proxy = &document["services"]["lo1-shop-proxy"];
        assert_eq!(proxy["image"], Value::from("caddy:2-alpine"));
        assert_eq!(proxy["ports"][0], Value::from("80:80"));
        assert_eq!(proxy["ports"][1], Value::from("8443:443"));
        let volume = proxy["volumes"][0].as_str().unwrap();
        assert!(volume.ends_with(":/etc/caddy/Caddyfile"));
        assert!(volume.contains(".lo1"));
    }

    #[test]
    fn test_contribution_gets_network() {
        let mut contributions = ComposeContribution::default();
        contributions.services.insert(
            "queue".into(),
            serde_yaml::from_str("image: rabbitmq:3").unwrap(),
        );
        let document =
            build_compose_document(&config(), &contributions, Path::new("/ws")).unwrap();
        let queue = &document["services"]["queue"];
        assert_eq!(queue["image"], Value::from("rabbitmq:3"));
        assert_eq!(queue["networks"][0], Value::from("lo1-shop-network"));
    }

    #[test]
    fn test_host_port_published() {
        let mut config = config();
        config.services.get_mut("db").unwrap().host_port = Some(15432);
        let document =
            build_compose_document(&config, &ComposeContribution::default(), Path::new("/ws"))
                .unwrap();
        assert_eq!(
            document["services"]["db"]["ports"][0],
            Value::from("15432:5432")
        );
    }

    #[tokio::test]
    async fn test_generate_partitions_and_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("infra.yaml"),
            "services:\n  postgres:\n    image: postgres:16\n  migrator:\n    image: shop/migrate\n",
        )
        .await
        .unwrap();

        let mut config = config();
        config.extra_compose = Some(crate::config::ExtraCompose::Detailed {
            file: PathBuf::from("infra.yaml"),
            init_task_services: vec!["migrator".into()],
        });

        let mut contributions = ComposeContribution::default();
        contributions.services.insert(
            "queue".into(),
            serde_yaml::from_str("image: rabbitmq:3").unwrap(),
        );

        let generation = generate(&config, &contributions, dir.path()).await.unwrap();
        assert_eq!(
            generation.infra_services,
            vec![
                "lo1-shop-proxy".to_string(),
                "migrator".into(),
                "postgres".into(),
                "queue".into()
            ]
        );
        assert_eq!(generation.app_services, vec!["db".to_string()]);
        assert_eq!(generation.init_tasks, vec!["migrator".to_string()]);
        assert_eq!(generation.infra_init_tasks(), vec!["migrator".to_string()]);
        assert!(generation.app_init_tasks().is_empty());

        // Generated file first, extra file included.
        assert_eq!(generation.file_args.len(), 2);
        assert!(generation.file_args[0].ends_with(".lo1/compose.generated.yaml"));
        assert!(generation.file_args[1].ends_with("infra.yaml"));
        assert!(tokio::fs::try_exists(&generation.file_args[0])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_per_service_compose_preprocessing() {
        let dir = tempfile::tempdir().unwrap();
        let svc_dir = dir.path().join("worker");
        tokio::fs::create_dir_all(&svc_dir).await.unwrap();
        tokio::fs::write(
            svc_dir.join("compose.yaml"),
            concat!(
                "services:\n",
                "  worker:\n",
                "    build: ./docker\n",
                "    volumes:\n",
                "      - ./data:/data\n",
                "      - named-vol:/cache\n",
            ),
        )
        .await
        .unwrap();

        let mut config = config();
        config.services.insert(
            "worker".into(),
            crate::config::ServiceConfig {
                service_type: "service".into(),
                path: "./worker".into(),
                port: None,
                host_port: None,
                mode: ServiceMode::Container,
                command: None,
                container_image: None,
                compose: Some(PathBuf::from("worker/compose.yaml")),
                env: BTreeMap::new(),
                proxy: None,
                hooks: None,
                depends_on: vec![],
                init_task: false,
                readiness_probe: None,
            },
        );

        let generation = generate(&config, &ComposeContribution::default(), dir.path())
            .await
            .unwrap();
        assert!(generation.app_services.contains(&"worker".to_string()));

        let preprocessed = generation
            .file_args
            .iter()
            .find(|p| p.ends_with("compose/worker.yaml"))
            .expect("preprocessed file in file args");
        let raw = tokio::fs::read_to_string(preprocessed).await.unwrap();
        let doc: Value = serde_yaml::from_str(&raw).unwrap();
        let worker = &doc["services"]["worker"];
        let build = worker["build"].as_str().unwrap();
        assert!(build.starts_with('/'), "build not absolute: {build}");
        assert!(build.ends_with("worker/docker"));
        let bind = worker["volumes"][0].as_str().unwrap();
        assert!(bind.starts_with('/'), "bind not absolute: {bind}");
        assert!(bind.ends_with(":/data"));
        assert_eq!(worker["volumes"][1], Value::from("named-vol:/cache"));
    }
}
