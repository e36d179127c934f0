//! Periodic reconciliation worker.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{error, info, instrument};

use tally_core::{defaults, Error, Result};

use crate::reconcile::{ReconcileReport, Reconciler};

/// Capacity of the worker event channel.
const EVENT_CAPACITY: usize = 64;

/// Configuration for the reconcile worker.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Seconds between passes. Zero disables the worker.
    pub interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::RECONCILE_INTERVAL_SECS,
        }
    }
}

impl ReconcileConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `RECONCILE_INTERVAL_SECS` | `0` | Seconds between passes, `0` disables |
    pub fn from_env() -> Self {
        let interval_secs = std::env::var("RECONCILE_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::RECONCILE_INTERVAL_SECS);
        Self { interval_secs }
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn enabled(&self) -> bool {
        self.interval_secs > 0
    }
}

/// Event emitted by the reconcile worker.
#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    WorkerStarted,
    /// A pass finished; per-transaction failures are in the report.
    PassCompleted(ReconcileReport),
    /// A pass could not read the store or the mirror.
    PassFailed { error: String },
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct ReconcileHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<ReconcileEvent>,
}

impl ReconcileHandle {
    /// Signal the worker to stop after the current pass.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.event_rx.resubscribe()
    }
}

/// Runs [`Reconciler::reconcile`] on a fixed interval.
pub struct ReconcileWorker {
    reconciler: Reconciler,
    config: ReconcileConfig,
    event_tx: broadcast::Sender<ReconcileEvent>,
}

impl ReconcileWorker {
    pub fn new(reconciler: Reconciler, config: ReconcileConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            reconciler,
            config,
            event_tx,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> ReconcileHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        ReconcileHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled() {
            info!(
                subsystem = "sync",
                component = "reconcile_worker",
                "Reconcile worker is disabled, not starting"
            );
            return;
        }

        info!(
            subsystem = "sync",
            component = "reconcile_worker",
            interval_secs = self.config.interval_secs,
            "Reconcile worker started"
        );
        let _ = self.event_tx.send(ReconcileEvent::WorkerStarted);

        let interval = Duration::from_secs(self.config.interval_secs);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(
                        subsystem = "sync",
                        component = "reconcile_worker",
                        "Reconcile worker received shutdown signal"
                    );
                    break;
                }
                _ = sleep(interval) => {}
            }

            match self.reconciler.reconcile().await {
                Ok(report) => {
                    let _ = self.event_tx.send(ReconcileEvent::PassCompleted(report));
                }
                Err(e) => {
                    error!(
                        subsystem = "sync",
                        component = "reconcile_worker",
                        error = %e,
                        "Reconciliation pass failed"
                    );
                    let _ = self.event_tx.send(ReconcileEvent::PassFailed {
                        error: e.to_string(),
                    });
                }
            }
        }

        let _ = self.event_tx.send(ReconcileEvent::WorkerStopped);
        info!(
            subsystem = "sync",
            component = "reconcile_worker",
            "Reconcile worker stopped"
        );
    }
}
