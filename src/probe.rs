//! HTTP readiness probe.
//!
//! Polls a URL until it answers 2xx, backing off exponentially between
//! attempts. The probe is bounded by a total timeout and by the cancellation
//! token, both of which surface as a readiness error for the service.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Default total probe budget
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);
/// Default first retry interval
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(1);
/// Default backoff multiplier applied after each failed attempt
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;
/// Default retry interval ceiling
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(5);
/// Per-attempt request timeout
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Parameters for one readiness probe
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// URL to poll
    pub url: String,
    /// Service the probe gates
    pub service_name: String,
    /// Total wall-clock budget
    pub timeout: Duration,
    /// First retry interval
    pub interval: Duration,
    /// Multiplier applied to the interval after each failure
    pub backoff_multiplier: f64,
    /// Interval ceiling
    pub max_interval: Duration,
}

impl ProbeOptions {
    /// Probe `url` for `service_name` with default timing
    #[must_use]
    pub fn new(service_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_name: service_name.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            interval: DEFAULT_PROBE_INTERVAL,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }
}

/// Poll until the URL answers 2xx.
///
/// Any non-2xx status or network error counts as a failed attempt. Fails
/// with [`Error::ReadinessProbe`] on timeout or cancellation.
pub async fn wait_for_ready(options: &ProbeOptions, cancel: &CancellationToken) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(ATTEMPT_TIMEOUT)
        .build()
        .map_err(|e| Error::readiness_probe(&options.service_name, format!("{}: {e}", options.url)))?;

    let deadline = tokio::time::Instant::now() + options.timeout;
    let mut interval = options.interval;
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            tracing::debug!(service = %options.service_name, "probe cancelled");
            return Err(Error::readiness_probe(&options.service_name, &options.url));
        }
        attempt += 1;
        match client.get(&options.url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    service = %options.service_name,
                    url = %options.url,
                    attempt,
                    "readiness probe succeeded"
                );
                return Ok(());
            }
            Ok(response) => {
                tracing::debug!(
                    service = %options.service_name,
                    attempt,
                    status = %response.status(),
                    "probe attempt failed"
                );
            }
            Err(e) => {
                tracing::debug!(
                    service = %options.service_name,
                    attempt,
                    error = %e,
                    "probe attempt failed"
                );
            }
        }

        if tokio::time::Instant::now() + interval > deadline {
            return Err(Error::readiness_probe(&options.service_name, &options.url));
        }
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = cancel.cancelled() => {
                return Err(Error::readiness_probe(&options.service_name, &options.url));
            }
        }
        interval = scale_interval(interval, options.backoff_multiplier, options.max_interval);
    }
}

fn scale_interval(interval: Duration, multiplier: f64, max: Duration) -> Duration {
    interval.mul_f64(multiplier).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_status(listener: TcpListener, status_line: &'static str) {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    }

    fn fast_options(url: String) -> ProbeOptions {
        ProbeOptions {
            timeout: Duration::from_secs(3),
            interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(200),
            ..ProbeOptions::new("api", url)
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_2xx() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_status(listener, "204 No Content"));

        let options = fast_options(format!("http://{addr}/health"));
        let cancel = CancellationToken::new();
        wait_for_ready(&options, &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_2xx_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_status(listener, "503 Service Unavailable"));

        let mut options = fast_options(format!("http://{addr}/health"));
        options.timeout = Duration::from_millis(300);
        let cancel = CancellationToken::new();
        let err = wait_for_ready(&options, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::ReadinessProbe { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_times_out() {
        let mut options = fast_options("http://127.0.0.1:1/unused".to_string());
        options.timeout = Duration::from_millis(200);
        let cancel = CancellationToken::new();
        let err = wait_for_ready(&options, &cancel).await.unwrap_err();
        match err {
            Error::ReadinessProbe { service, url } => {
                assert_eq!(service, "api");
                assert!(url.contains("/unused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_checked_first() {
        let options = fast_options("http://127.0.0.1:1/unused".to_string());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_ready(&options, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::ReadinessProbe { .. }));
    }

    #[test]
    fn test_backoff_clamped() {
        let scaled = scale_interval(
            Duration::from_secs(4),
            1.5,
            Duration::from_secs(5),
        );
        assert_eq!(scaled, Duration::from_secs(5));
        let scaled = scale_interval(Duration::from_secs(1), 1.5, Duration::from_secs(5));
        assert_eq!(scaled, Duration::from_millis(1500));
    }
}
