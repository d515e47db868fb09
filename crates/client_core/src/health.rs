//! Periodic connectivity probe against the backend root.

use std::{sync::Arc, time::Duration};

use shared::domain::ConnectivityState;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

use crate::TranscriptionBackend;

pub async fn check_once(backend: &dyn TranscriptionBackend) -> ConnectivityState {
    backend.health().await
}

/// Background poller publishing the latest [`ConnectivityState`].
///
/// Starts in `Checking`; only changes are published. Dropping the monitor
/// stops the poller.
pub struct HealthMonitor {
    state: watch::Receiver<ConnectivityState>,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    pub fn spawn(backend: Arc<dyn TranscriptionBackend>, interval: Duration) -> Self {
        let (tx, state) = watch::channel(ConnectivityState::Checking);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let next = backend.health().await;
                let changed = tx.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        *current = next.clone();
                        true
                    }
                });
                if changed {
                    match &next {
                        ConnectivityState::Offline(reason) => {
                            warn!(%reason, "transcription server offline")
                        }
                        _ => info!(state = ?next, "transcription server connectivity changed"),
                    }
                }
                if tx.is_closed() {
                    break;
                }
            }
        });
        Self { state, task }
    }

    pub fn current(&self) -> ConnectivityState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.clone()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/health_tests.rs"]
mod tests;
