//! Core server functionality
//!
//! This module provides:
//! - Server lifecycle management (shutdown requests)
//! - Signal handling
//! - Logging set-up with a runtime-adjustable level
//! - Core constants and utilities

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Notify;

/// Server tick rate in nanoseconds (10ms = 10,000,000 ns)
/// This controls how fast the main server loop runs
pub const SERVER_TICK_RATE_NS: u64 = 10_000_000;

/// Server tick rate as a Duration for convenience
pub const SERVER_TICK_RATE: Duration = Duration::from_nanos(SERVER_TICK_RATE_NS);

/// Shared lifecycle flag. Any task may request shutdown; the main loop
/// waits on it.
#[derive(Debug, Default)]
pub struct ServerState {
    shutdown_requested: AtomicBool,
    notify: Notify,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request server shutdown
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if shutdown has been requested
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait_for_shutdown(&self) {
        loop {
            let notified = self.notify.notified();
            if self.should_shutdown() {
                return;
            }
            notified.await;
        }
    }
}

/// Signals that stop the servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGHUP
    Hangup,
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM (graceful shutdown)
    Terminate,
}

/// Wait for the first of SIGHUP, SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn wait_for_signal() -> Result<Signal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hup = signal(SignalKind::hangup()).context("cannot install SIGHUP handler")?;
    let mut int = signal(SignalKind::interrupt()).context("cannot install SIGINT handler")?;
    let mut term = signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;
    let sig = tokio::select! {
        _ = hup.recv() => Signal::Hangup,
        _ = int.recv() => Signal::Interrupt,
        _ = term.recv() => Signal::Terminate,
    };
    Ok(sig)
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> Result<Signal> {
    tokio::signal::ctrl_c().await.context("cannot install Ctrl+C handler")?;
    Ok(Signal::Interrupt)
}

/// Format an uptime as `"%dd %dh%dm%ds"`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, rest) = (secs / 86_400, secs % 86_400);
    let (hours, rest) = (rest / 3_600, rest % 3_600);
    let (mins, secs) = (rest / 60, rest % 60);
    format!("{}d {}h{}m{}s", days, hours, mins, secs)
}

/// Read console lines from stdin and hand each non-empty one to `handle`,
/// until end of input or shutdown.
pub async fn console_loop<F, Fut>(state: &ServerState, mut handle: F)
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = state.wait_for_shutdown() => return,
        };
        match line {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    handle(line.to_string()).await;
                }
            }
            Ok(None) => {
                tracing::info!("[console] [eof]");
                return;
            }
            Err(e) => {
                tracing::error!("[console] [read_failed] err={}", e);
                return;
            }
        }
    }
}

/// Changes the active log level, e.g. from the `loglevel` console command.
pub type LogLevelSetter = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Map the console level names onto tracing filter directives.
pub fn log_directive(level: &str) -> Option<&'static str> {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARNING" | "WARN" => Some("warn"),
        "ERROR" => Some("error"),
        _ => None,
    }
}

/// Install the fmt subscriber used by the binaries.
///
/// The filter comes from `RUST_LOG` (default `info`) and can be replaced
/// later through the returned setter.
pub fn init_logging() -> LogLevelSetter {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, reload, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr())))
        .init();

    Box::new(move |level: &str| {
        let directive = log_directive(level)
            .with_context(|| format!("unknown log level '{}'", level))?;
        handle
            .reload(EnvFilter::new(directive))
            .context("cannot change the log filter")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_server_state_shutdown() {
        let state = ServerState::new();
        assert!(!state.should_shutdown());

        state.request_shutdown();
        assert!(state.should_shutdown());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_wakes_up() {
        let state = Arc::new(ServerState::new());
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_for_shutdown().await })
        };
        tokio::task::yield_now().await;
        state.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wait_after_request_returns() {
        let state = ServerState::new();
        state.request_shutdown();
        tokio::time::timeout(Duration::from_millis(100), state.wait_for_shutdown())
            .await
            .unwrap();
    }

    #[test]
    fn test_uptime_format() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 0h0m0s");
        assert_eq!(format_uptime(Duration::from_secs(86_400 + 3_600 * 2 + 60 * 3 + 4)), "1d 2h3m4s");
    }

    #[test]
    fn test_log_directives() {
        assert_eq!(log_directive("warning"), Some("warn"));
        assert_eq!(log_directive("DEBUG"), Some("debug"));
        assert_eq!(log_directive("verbose"), None);
    }

    #[test]
    fn test_constants() {
        assert_eq!(SERVER_TICK_RATE_NS, 10_000_000);
        assert_eq!(SERVER_TICK_RATE, Duration::from_millis(10));
    }
}
