//! Command-line front-end.
//!
//! Argument parsing, command dispatch, and error rendering. All real work
//! happens in the orchestrator and its collaborators; the CLI wires them to
//! the terminal: colored event output in human mode, event/error objects in
//! `--json` mode, exit code 0 on success and 1 on any error.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use crate::config::ServiceMode;
use crate::error::Result;

pub mod down;
pub mod hosts;
pub mod init;
pub mod logs;
pub mod printer;
pub mod status;
pub mod tls;
pub mod up;

/// Local multi-service development orchestrator
#[derive(Debug, Parser)]
#[command(name = "lo1", version, about)]
pub struct Cli {
    /// Render output and errors as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Workspace directory (default: current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Run-mode override accepted by `up --mode`
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Host processes
    Dev,
    /// Compose-managed containers
    Container,
}

impl From<ModeArg> for ServiceMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Dev => Self::Dev,
            ModeArg::Container => Self::Container,
        }
    }
}

/// All lo1 subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clone the repositories listed in the manifest
    Init {
        /// Stop at the first clone failure
        #[arg(long)]
        fail_fast: bool,
    },
    /// Bring the workspace up
    Up {
        /// Only these services (plus their dependencies)
        #[arg(long, value_delimiter = ',')]
        services: Vec<String>,
        /// Force every non-skip service into this mode
        #[arg(long)]
        mode: Option<ModeArg>,
        /// Return once the workspace is ready instead of waiting
        #[arg(short, long)]
        detach: bool,
        /// Leave everything running when the foreground run exits
        #[arg(long)]
        skip_teardown: bool,
        /// On teardown, also remove volumes and orphans
        #[arg(long)]
        clean: bool,
    },
    /// Stop the running workspace
    Down {
        /// Also remove volumes and orphan containers
        #[arg(long)]
        clean: bool,
    },
    /// Show the recorded run and its container states
    Status,
    /// Manage the hosts-file block for proxy domains
    Hosts {
        /// Write the block for the current manifest
        #[arg(long)]
        apply: bool,
        /// Delete the block
        #[arg(long)]
        remove: bool,
    },
    /// Install the proxy CA into the host trust store
    TlsSetup,
    /// Print captured service logs
    Logs {
        /// Service to print; everything when omitted
        service: Option<String>,
        /// List services with captured logs
        #[arg(long)]
        list: bool,
    },
}

impl Cli {
    /// Resolved workspace directory
    #[must_use]
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Dispatch the parsed CLI and return the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let json = cli.json;
    let result = dispatch(cli).await;
    match result {
        Ok(()) => 0,
        Err(e) => {
            if json {
                println!("{}", e.to_json());
            } else {
                eprintln!("{} {e}", "error:".red().bold());
            }
            1
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let workspace_dir = cli.workspace_dir();
    match cli.command {
        Commands::Init { fail_fast } => init::run(&workspace_dir, fail_fast, cli.json).await,
        Commands::Up {
            services,
            mode,
            detach,
            skip_teardown,
            clean,
        } => {
            up::run(up::UpArgs {
                workspace_dir,
                services,
                mode: mode.map(Into::into),
                detach,
                skip_teardown,
                clean,
                json: cli.json,
            })
            .await
        }
        Commands::Down { clean } => down::run(&workspace_dir, clean, cli.json).await,
        Commands::Status => status::run(&workspace_dir, cli.json).await,
        Commands::Hosts { apply, remove } => {
            hosts::run(&workspace_dir, apply, remove).await
        }
        Commands::TlsSetup => tls::run(&workspace_dir).await,
        Commands::Logs { service, list } => logs::run(&workspace_dir, service, list).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_up_flags() {
        let cli = Cli::parse_from([
            "lo1",
            "up",
            "--services",
            "api,web",
            "--mode",
            "container",
            "-d",
            "--clean",
        ]);
        match cli.command {
            Commands::Up {
                services,
                mode,
                detach,
                skip_teardown,
                clean,
            } => {
                assert_eq!(services, ["api", "web"]);
                assert!(matches!(mode, Some(ModeArg::Container)));
                assert!(detach);
                assert!(!skip_teardown);
                assert!(clean);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_anywhere() {
        let cli = Cli::parse_from(["lo1", "down", "--json", "--clean"]);
        assert!(cli.json);
        match cli.command {
            Commands::Down { clean } => assert!(clean),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_logs_takes_optional_service() {
        let cli = Cli::parse_from(["lo1", "logs", "api"]);
        match cli.command {
            Commands::Logs { service, list } => {
                assert_eq!(service.as_deref(), Some("api"));
                assert!(!list);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
