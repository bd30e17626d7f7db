//! Coordinated shutdown (§5).
//!
//! A single [`tokio_util::sync::CancellationToken`] is handed to every
//! background task at spawn time. `Shutdown::trigger` cancels it and then
//! waits (bounded by `grace_period`) for every task registered through
//! `track` to finish its current unit of work, so the query server and the
//! ingestion loop both drain in flight work before exiting.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Shutdown {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    grace_period: Duration,
}

impl Shutdown {
    pub fn new(grace_period: Duration) -> Self {
        Shutdown {
            token: CancellationToken::new(),
            tasks: Vec::new(),
            grace_period,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.push(handle);
    }

    /// Cancels the shared token, then waits up to `grace_period` for all
    /// tracked tasks to finish. Tasks still running after the deadline
    /// are abandoned (their `JoinHandle` is dropped, not aborted) so a
    /// hung task cannot block process exit.
    pub async fn trigger(self) {
        self.token.cancel();
        let drain = futures::future::join_all(self.tasks);
        if tokio::time::timeout(self.grace_period, drain).await.is_err() {
            log::warn!("shutdown grace period elapsed with tasks still running");
        }
    }
}

/// Resolves once either `SIGINT`/`SIGTERM` is received.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
