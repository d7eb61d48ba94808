//! `compose logs -f` follower.
//!
//! Compose prefixes every line with `service-N  | `; the follower splits the
//! prefix off, strips the replica suffix, and emits per-service output lines.

use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::compose::{ComposeOptions, LogsHandle};
use crate::error::{Error, Result};
use crate::events::{EventSender, LogLine, StreamKind};

/// Build the full `logs` argument vector.
#[must_use]
pub fn logs_args(options: &ComposeOptions) -> Vec<String> {
    let mut args = options.base_args();
    args.extend(
        ["logs", "-f", "--no-color", "--since", "0s"]
            .iter()
            .map(ToString::to_string),
    );
    args
}

/// Start the follower and stream parsed lines into the event bus.
pub async fn run_logs(options: &ComposeOptions, events: &EventSender) -> Result<LogsHandle> {
    let args = logs_args(options);
    let mut child = Command::new("docker")
        .args(&args)
        .current_dir(&options.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::compose_exec("logs", format!("failed to spawn docker: {e}")))?;

    if let Some(stdout) = child.stdout.take() {
        spawn_parser(stdout, StreamKind::Stdout, events.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_parser(stderr, StreamKind::Stderr, events.clone());
    }
    Ok(LogsHandle::new(child))
}

fn spawn_parser<R>(reader: R, stream: StreamKind, events: EventSender)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(raw)) = lines.next_line().await {
            let (service, text) = split_line(&raw);
            events.emit_output(LogLine::now(service, stream, text));
        }
    });
}

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\S+)\s+\|\s?(.*)$").expect("valid pattern"))
}

/// Split `service-N  | text` into an owner and the line text.
///
/// Lines without the prefix (tool chatter) are attributed to `compose`.
#[must_use]
pub fn split_line(raw: &str) -> (String, String) {
    match line_pattern().captures(raw) {
        Some(captures) => {
            let service = strip_replica_suffix(&captures[1]);
            (service, captures[2].to_string())
        }
        None => ("compose".to_string(), raw.to_string()),
    }
}

/// Strip the `-N` replica suffix compose appends to container names.
fn strip_replica_suffix(service: &str) -> String {
    match service.rsplit_once('-') {
        Some((base, suffix)) if !base.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => {
            base.to_string()
        }
        _ => service.to_string(),
    }
}
