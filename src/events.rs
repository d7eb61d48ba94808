//! In-process event stream between the orchestrator and its consumer.
//!
//! Events travel over a bounded `mpsc` channel. `Output` lines are the only
//! droppable kind: when the channel is full they are discarded rather than
//! stalling the orchestrator. `Phase`, `Service`, `Hook`, and `Error` events
//! use an awaited send and are never dropped. A closed receiver silences the
//! sender instead of failing the run.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Which stream a subprocess line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of service output
#[derive(Debug, Clone)]
pub struct LogLine {
    /// Service that produced the line
    pub service: String,
    /// Originating stream
    pub stream: StreamKind,
    /// Line text, newline stripped
    pub text: String,
    /// When the line was read
    pub timestamp: DateTime<Utc>,
}

impl LogLine {
    /// Build a line stamped with the current time
    #[must_use]
    pub fn now(service: impl Into<String>, stream: StreamKind, text: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            stream,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Service lifecycle notification status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// The starter began work on the service
    Starting,
    /// The service is up (probe passed, hooks done)
    Started,
    /// Teardown of the service began
    Stopping,
    /// The service is down
    Stopped,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Started => write!(f, "started"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Everything the orchestrator reports while running
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// A named phase began
    Phase {
        /// Phase description
        phase: String,
    },
    /// A service changed lifecycle state
    Service {
        /// Service name
        service: String,
        /// New status
        status: ServiceStatus,
    },
    /// A lifecycle hook completed
    Hook {
        /// Hook name
        hook: String,
        /// Captured hook output
        output: String,
    },
    /// A line of service output
    Output {
        /// The line
        line: LogLine,
    },
    /// A non-fatal problem worth surfacing
    Error {
        /// Description
        message: String,
    },
}

/// Default channel capacity for the event bus
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Sending half of the event bus
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<mpsc::Sender<OrchestratorEvent>>,
}

impl EventSender {
    /// Create a connected sender/receiver pair
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<OrchestratorEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that discards everything
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit a must-deliver event, waiting for channel space if necessary
    pub async fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver means the consumer went away; keep running.
            let _ = tx.send(event).await;
        }
    }

    /// Emit an output line, dropped when the channel is full
    pub fn emit_output(&self, line: LogLine) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(OrchestratorEvent::Output { line });
        }
    }

    /// Emit a phase event
    pub async fn phase(&self, phase: impl Into<String>) {
        self.emit(OrchestratorEvent::Phase {
            phase: phase.into(),
        })
        .await;
    }

    /// Emit a service status event
    pub async fn service(&self, service: impl Into<String>, status: ServiceStatus) {
        self.emit(OrchestratorEvent::Service {
            service: service.into(),
            status,
        })
        .await;
    }

    /// Emit a hook completion event
    pub async fn hook(&self, hook: impl Into<String>, output: impl Into<String>) {
        self.emit(OrchestratorEvent::Hook {
            hook: hook.into(),
            output: output.into(),
        })
        .await;
    }

    /// Emit a non-fatal error event
    pub async fn error(&self, message: impl Into<String>) {
        self.emit(OrchestratorEvent::Error {
            message: message.into(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_round_trip() {
        let (sender, mut rx) = EventSender::channel();
        sender.phase("Loading config").await;
        sender.service("api", ServiceStatus::Starting).await;
        sender.emit_output(LogLine::now("api", StreamKind::Stdout, "listening"));

        match rx.recv().await.unwrap() {
            OrchestratorEvent::Phase { phase } => assert_eq!(phase, "Loading config"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            OrchestratorEvent::Service { service, status } => {
                assert_eq!(service, "api");
                assert_eq!(status, ServiceStatus::Starting);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            OrchestratorEvent::Output { line } => {
                assert_eq!(line.text, "listening");
                assert_eq!(line.stream, StreamKind::Stdout);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_output_dropped_when_full() {
        let (tx, rx) = mpsc::channel(1);
        let sender = EventSender { tx: Some(tx) };
        sender.emit_output(LogLine::now("api", StreamKind::Stdout, "kept"));
        sender.emit_output(LogLine::now("api", StreamKind::Stdout, "dropped"));
        drop(sender);

        let mut rx = rx;
        let mut texts = Vec::new();
        while let Some(event) = rx.recv().await {
            if let OrchestratorEvent::Output { line } = event {
                texts.push(line.text);
            }
        }
        assert_eq!(texts, ["kept"]);
    }

    #[tokio::test]
    async fn test_disabled_sender_is_silent() {
        let sender = EventSender::disabled();
        sender.phase("anything").await;
        sender.emit_output(LogLine::now("api", StreamKind::Stderr, "x"));
    }
}
