//! Bounded producer-consumer queue between the listener and the dispatchers.

use crate::context::Shutdown;
use log::debug;
use shared::ConnectRequest;
use tokio::sync::{mpsc, Mutex};

/// Capacity of the admission queue. Inserts block once this many requests
/// are pending.
pub const ADMISSION_CAPACITY: usize = 10;

/// Multi-producer/multi-consumer queue of pending connect requests. FIFO:
/// removal order matches insertion order. Both ends block with wakeup on
/// shutdown instead of spinning.
pub struct AdmissionQueue {
    tx: mpsc::Sender<ConnectRequest>,
    // single receiver shared by the dispatcher pool; the lock hands items
    // out strictly in arrival order
    rx: Mutex<mpsc::Receiver<ConnectRequest>>,
    shutdown: Shutdown,
}

impl AdmissionQueue {
    pub fn new(capacity: usize, shutdown: Shutdown) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            shutdown,
        }
    }

    /// Blocks until the queue has room. On shutdown the request is dropped
    /// without inserting.
    pub async fn insert(&self, request: ConnectRequest) {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                debug!("admission queue shut down, dropping connect request");
            }
            permit = self.tx.reserve() => match permit {
                Ok(permit) => permit.send(request),
                Err(_) => debug!("admission queue closed, dropping connect request"),
            },
        }
    }

    /// Blocks until a request is available. Returns `None` once shutdown has
    /// been triggered; every blocked consumer observes it.
    pub async fn remove(&self) -> Option<ConnectRequest> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            request = rx.recv() => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn request(tag: u32) -> ConnectRequest {
        ConnectRequest {
            request_channel: format!("/tmp/req_{tag}"),
            notify_channel: format!("/tmp/notify_{tag}"),
        }
    }

    #[tokio::test]
    async fn test_remove_returns_insertion_order() {
        let queue = AdmissionQueue::new(4, Shutdown::new());

        for tag in 0..4 {
            queue.insert(request(tag)).await;
        }
        for tag in 0..4 {
            assert_eq!(queue.remove().await, Some(request(tag)));
        }
    }

    #[tokio::test]
    async fn test_insert_blocks_until_capacity_frees() {
        let queue = std::sync::Arc::new(AdmissionQueue::new(1, Shutdown::new()));
        queue.insert(request(0)).await;

        let blocked = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.insert(request(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        assert_eq!(queue.remove().await, Some(request(0)));
        timeout(Duration::from_secs(1), blocked)
            .await
            .expect("insert should unblock once a slot frees")
            .unwrap();
        assert_eq!(queue.remove().await, Some(request(1)));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_every_blocked_consumer() {
        let shutdown = Shutdown::new();
        let queue = std::sync::Arc::new(AdmissionQueue::new(2, shutdown.clone()));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.remove().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        for consumer in consumers {
            let result = timeout(Duration::from_secs(1), consumer)
                .await
                .expect("blocked consumer should wake on shutdown")
                .unwrap();
            assert_eq!(result, None);
        }
    }

    #[tokio::test]
    async fn test_insert_after_shutdown_is_dropped() {
        let shutdown = Shutdown::new();
        let queue = AdmissionQueue::new(2, shutdown.clone());
        shutdown.trigger();

        queue.insert(request(0)).await;
        assert_eq!(queue.remove().await, None);
    }
}
