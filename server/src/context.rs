//! Shared server context handed to every actor, replacing ambient globals.

use crate::admission::{AdmissionQueue, ADMISSION_CAPACITY};
use crate::slots::SlotPool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding the `.lvl` level files.
    pub levels_dir: PathBuf,
    /// Maximum number of concurrent sessions; also the dispatcher pool size.
    pub max_games: usize,
    /// Path of the rendezvous channel clients connect to.
    pub registry_path: PathBuf,
}

/// Process-wide cancellation signal. Triggering it flips a watch flag that
/// every blocking wait `select!`s on, so all parked actors wake exactly once
/// and terminate cooperatively.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered. Usable as a `select!` arm
    /// from any number of actors concurrently.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the actors share: configuration, the slot pool, the admission
/// queue, and the shutdown signal. Passed by `Arc` to every task.
pub struct ServerContext {
    pub config: ServerConfig,
    pub slots: SlotPool,
    pub admission: AdmissionQueue,
    pub shutdown: Shutdown,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let shutdown = Shutdown::new();
        Arc::new(Self {
            slots: SlotPool::new(config.max_games),
            admission: AdmissionQueue::new(ADMISSION_CAPACITY, shutdown.clone()),
            shutdown,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_shutdown());

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.cancelled().await })
        };

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve after trigger")
            .unwrap();
        assert!(shutdown.is_shutdown());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_when_already_triggered() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.cancelled())
            .await
            .expect("cancelled() should resolve immediately");
    }
}
