//! The `down` command.

use std::path::Path;

use crate::cli::printer::spawn_printer;
use crate::error::Result;
use crate::events::EventSender;
use crate::orchestrator::{stop_workspace, OrchestratorDeps, StopOptions};
use crate::paths;

/// Run `lo1 down`.
pub async fn run(workspace_dir: &Path, clean: bool, json: bool) -> Result<()> {
    let deps = OrchestratorDeps::default();
    let (events, rx) = EventSender::channel();
    let printer = spawn_printer(rx, paths::logs_dir(workspace_dir), json);

    let options = StopOptions {
        workspace_dir: workspace_dir.to_path_buf(),
        clean,
    };
    let result = stop_workspace(&options, None, &deps, &events).await;
    drop(events);
    let _ = printer.await;
    result
}
