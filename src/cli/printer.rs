//! Event consumer: terminal rendering and per-service log files.
//!
//! One task drains the orchestrator's event channel, prints colored lines in
//! human mode (or JSON objects in `--json` mode), and appends every service
//! output line to `.lo1/logs/<service>.log` so `lo1 logs` has something to
//! read after a detached run.

use std::collections::HashMap;
use std::path::PathBuf;

use colored::Colorize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::{OrchestratorEvent, ServiceStatus, StreamKind};

const SERVICE_COLORS: &[colored::Color] = &[
    colored::Color::Cyan,
    colored::Color::Magenta,
    colored::Color::Green,
    colored::Color::Yellow,
    colored::Color::Blue,
    colored::Color::BrightCyan,
    colored::Color::BrightMagenta,
];

/// Spawn the consumer task for one run.
pub fn spawn_printer(
    mut rx: mpsc::Receiver<OrchestratorEvent>,
    logs_dir: PathBuf,
    json: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sink = LogSink::new(logs_dir);
        while let Some(event) = rx.recv().await {
            if let OrchestratorEvent::Output { line } = &event {
                sink.append(line).await;
            }
            if json {
                println!("{}", event_json(&event));
            } else {
                print_human(&event);
            }
        }
        sink.flush().await;
    })
}

fn print_human(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::Phase { phase } => {
            println!("{} {}", "==>".blue().bold(), phase.bold());
        }
        OrchestratorEvent::Service { service, status } => {
            let status_str = match status {
                ServiceStatus::Starting => "starting".yellow(),
                ServiceStatus::Started => "started".green(),
                ServiceStatus::Stopping => "stopping".yellow(),
                ServiceStatus::Stopped => "stopped".dimmed(),
            };
            println!("  {} {}", service.color(service_color(service)), status_str);
        }
        OrchestratorEvent::Hook { hook, output } => {
            println!("  {} {}", "hook".cyan(), hook);
            for line in output.lines() {
                println!("    {}", line.dimmed());
            }
        }
        OrchestratorEvent::Output { line } => {
            let prefix = format!("{} |", line.service).color(service_color(&line.service));
            match line.stream {
                StreamKind::Stdout => println!("{prefix} {}", line.text),
                StreamKind::Stderr => println!("{prefix} {}", line.text.red()),
            }
        }
        OrchestratorEvent::Error { message } => {
            eprintln!("{} {message}", "error:".red().bold());
        }
    }
}

fn event_json(event: &OrchestratorEvent) -> serde_json::Value {
    match event {
        OrchestratorEvent::Phase { phase } => {
            serde_json::json!({ "event": "phase", "phase": phase })
        }
        OrchestratorEvent::Service { service, status } => serde_json::json!({
            "event": "service",
            "service": service,
            "status": status.to_string(),
        }),
        OrchestratorEvent::Hook { hook, output } => serde_json::json!({
            "event": "hook",
            "hook": hook,
            "output": output,
        }),
        OrchestratorEvent::Output { line } => serde_json::json!({
            "event": "output",
            "service": &line.service,
            "stream": line.stream.to_string(),
            "text": &line.text,
            "timestamp": line.timestamp.to_rfc3339(),
        }),
        OrchestratorEvent::Error { message } => {
            serde_json::json!({ "event": "error", "message": message })
        }
    }
}

fn service_color(service: &str) -> colored::Color {
    let hash: usize = service.bytes().map(usize::from).sum();
    SERVICE_COLORS[hash % SERVICE_COLORS.len()]
}

/// Append-only per-service log files under `.lo1/logs/`
struct LogSink {
    logs_dir: PathBuf,
    files: HashMap<String, tokio::fs::File>,
    dir_ready: bool,
}

impl LogSink {
    fn new(logs_dir: PathBuf) -> Self {
        Self {
            logs_dir,
            files: HashMap::new(),
            dir_ready: false,
        }
    }

    async fn append(&mut self, line: &crate::events::LogLine) {
        if !self.dir_ready {
            if tokio::fs::create_dir_all(&self.logs_dir).await.is_err() {
                return;
            }
            self.dir_ready = true;
        }
        if !self.files.contains_key(&line.service) {
            let path = self.logs_dir.join(format!("{}.log", sanitize(&line.service)));
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    self.files.insert(line.service.clone(), file);
                }
                Err(_) => return,
            }
        }
        if let Some(file) = self.files.get_mut(&line.service) {
            let entry = format!(
                "{} [{}] {}\n",
                line.timestamp.to_rfc3339(),
                line.stream,
                line.text
            );
            let _ = file.write_all(entry.as_bytes()).await;
        }
    }

    async fn flush(&mut self) {
        for file in self.files.values_mut() {
            let _ = file.flush().await;
        }
    }
}

fn sanitize(service: &str) -> String {
    service
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
