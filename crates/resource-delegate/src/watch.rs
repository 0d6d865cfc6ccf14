//! WatchMultiplexer (component C8): bridges a backend's event channel into
//! a single, idempotently-stoppable watch stream, per spec.md §4.8.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

/// A single change notification forwarded from a backend. Serializes to the
/// Kubernetes watch wire shape (`{"type": "ADDED", "object": ...}`) so an
/// HTTP surface can stream it out directly.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "object", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

/// A single watch's state: a guarded `closed` flag plus the channel events
/// are forwarded through. `addEvent`/`Stop`/`ResultChan` mirror spec.md
/// §4.8's `watcher` exactly.
struct WatcherInner<T> {
    closed: RwLock<bool>,
    sender: mpsc::Sender<WatchEvent<T>>,
}

/// Handle to a live watch. Cloning shares the same underlying channel and
/// `closed` flag — `Stop` on any clone stops all of them.
pub struct Watcher<T> {
    inner: Arc<WatcherInner<T>>,
    receiver: Arc<RwLock<Option<mpsc::Receiver<WatchEvent<T>>>>>,
}

impl<T> Clone for Watcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            receiver: Arc::clone(&self.receiver),
        }
    }
}

impl<T> Watcher<T>
where
    T: Send + 'static,
{
    pub fn new(buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        Self {
            inner: Arc::new(WatcherInner {
                closed: RwLock::new(false),
                sender,
            }),
            receiver: Arc::new(RwLock::new(Some(receiver))),
        }
    }

    /// `addEvent(e)`: take a read lock, and if not closed, send. May block
    /// (backpressure by design) if the channel is full; returns whether the
    /// event was accepted.
    pub async fn add_event(&self, event: WatchEvent<T>) -> bool {
        let closed = self.inner.closed.read().await;
        if *closed {
            return false;
        }
        self.inner.sender.send(event).await.is_ok()
    }

    /// `Stop()`: take a write lock; if not already closed, set the flag.
    /// Idempotent — a second call is a no-op.
    pub async fn stop(&self) {
        let mut closed = self.inner.closed.write().await;
        if !*closed {
            *closed = true;
        }
    }

    pub async fn is_closed(&self) -> bool {
        *self.inner.closed.read().await
    }

    /// `ResultChan()`: takes the receive side. Can only be taken once per
    /// watcher; subsequent calls return `None`.
    pub async fn result_chan(&self) -> Option<mpsc::Receiver<WatchEvent<T>>> {
        self.receiver.write().await.take()
    }
}

/// Forwards a backend's event stream into a [`Watcher`], exiting cleanly
/// when either side closes: the backend closing its source channel, or the
/// watcher being stopped. Events from a single backend channel preserve
/// their arrival order; no ordering contract across multiple concurrently
/// forwarded sources (spec.md §4.8).
pub async fn forward<T>(
    mut source: mpsc::Receiver<WatchEvent<T>>,
    watcher: Watcher<T>,
) where
    T: Send + 'static,
{
    while let Some(event) = source.recv().await {
        if !watcher.add_event(event).await {
            break;
        }
        if watcher.is_closed().await {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_is_idempotent() {
        let watcher: Watcher<i32> = Watcher::new(4);
        watcher.stop().await;
        watcher.stop().await;
        assert!(watcher.is_closed().await);
    }

    #[tokio::test]
    async fn add_event_rejected_after_stop() {
        let watcher: Watcher<i32> = Watcher::new(4);
        watcher.stop().await;
        assert!(!watcher.add_event(WatchEvent::Added(1)).await);
    }

    #[tokio::test]
    async fn forwarding_preserves_order() {
        let watcher: Watcher<i32> = Watcher::new(8);
        let mut result_chan = watcher.result_chan().await.unwrap();

        let (source_tx, source_rx) = mpsc::channel(8);
        let forward_watcher = watcher.clone();
        let forwarding = tokio::spawn(forward(source_rx, forward_watcher));

        source_tx.send(WatchEvent::Added(1)).await.unwrap();
        source_tx.send(WatchEvent::Modified(2)).await.unwrap();
        source_tx.send(WatchEvent::Deleted(3)).await.unwrap();
        drop(source_tx);

        let mut seen = Vec::new();
        while let Some(event) = result_chan.recv().await {
            seen.push(match event {
                WatchEvent::Added(n) | WatchEvent::Modified(n) | WatchEvent::Deleted(n) => n,
            });
        }
        forwarding.await.unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn result_chan_can_only_be_taken_once() {
        let watcher: Watcher<i32> = Watcher::new(4);
        assert!(watcher.result_chan().await.is_some());
        assert!(watcher.result_chan().await.is_none());
    }
}
