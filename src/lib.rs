//! # lo1
//!
//! A local multi-service development orchestrator.
//!
//! Given a declarative `lo1.yaml` manifest listing services, their
//! dependencies, container images and/or host commands, and a set of
//! infrastructure extras (databases, queues, a reverse proxy, init tasks),
//! lo1 brings the entire stack up in dependency order, streams its logs,
//! and tears it down cleanly on exit or failure.
//!
//! lo1 does not run containers itself — it shells out to the local
//! `docker` / `docker compose` tools — but it does directly supervise host
//! processes for services in `dev` mode.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use lo1::events::EventSender;
//! use lo1::orchestrator::{
//!     start_workspace, stop_workspace, OrchestratorDeps, StartOptions, StopOptions,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lo1::Error> {
//!     let deps = OrchestratorDeps::default();
//!     let (events, _rx) = EventSender::channel();
//!     let cancel = CancellationToken::new();
//!
//!     let options = StartOptions::new("./my-workspace");
//!     let started = start_workspace(&options, &deps, &events, &cancel).await?;
//!     println!("{} services up", started.handles.len());
//!
//!     let stop = StopOptions {
//!         workspace_dir: "./my-workspace".into(),
//!         clean: false,
//!     };
//!     stop_workspace(&stop, None, &deps, &events).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`config`] - manifest loading and validation
//! - [`dag`] - dependency graph and parallel execution layers
//! - [`endpoints`] - service URL derivation and discovery env vars
//! - [`runner`] - process and container supervision handles
//! - [`compose`] - the compose tool seam (`up`, `wait`, `logs`, `ps`, `down`)
//! - [`probe`] - HTTP readiness polling
//! - [`hooks`] - lifecycle shell hooks
//! - [`state`] - crash-recovery state file under `.lo1/`
//! - [`service`] - per-service start (runner choice, env, probe gating)
//! - [`orchestrator`] - the phase sequence behind `up` and `down`
//! - [`plugin`] - typed workspace extensions
//! - [`cli`] - the `lo1` binary front-end

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub use config::{ServiceConfig, ServiceMode, WorkspaceConfig};
pub use dag::{build_dag, ExecutionPlan};
pub use endpoints::{
    build_discovery_env_vars, build_endpoint_registry, build_service_env, ConsumerMode,
    EndpointRegistry, ServiceEndpoint,
};
pub use error::{Error, Result};
pub use events::{EventSender, LogLine, OrchestratorEvent, ServiceStatus, StreamKind};
pub use filter::resolve_service_filter;
pub use runner::{RunnerKind, ServiceHandle};
pub use state::WorkspaceState;

pub mod cli;
pub mod compose;
pub mod composegen;
pub mod config;
pub mod dag;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod filter;
pub mod hooks;
pub mod hosts;
pub mod orchestrator;
pub mod paths;
pub mod plugin;
pub mod prerequisites;
pub mod probe;
pub mod proxygen;
pub mod runner;
pub mod service;
pub mod state;
pub mod tls;

mod stream;
