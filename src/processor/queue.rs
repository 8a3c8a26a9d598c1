//! Bounded queues with blocking producers and an observable depth gauge.
//!
//! Both the work queue (block numbers) and the ranking queue (scanned blocks) are
//! built on `tokio::sync::mpsc` with a fixed capacity: producers await when
//! the queue is full, which is the pipeline's only load-shedding mechanism.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::SendError, error::TryRecvError};
use tokio::sync::Mutex;

/// Read-only view of a queue's depth for reporting.
#[derive(Debug, Clone)]
pub struct QueueDepth {
    depth: Arc<AtomicUsize>,
    capacity: usize,
}

impl QueueDepth {
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn increment(&self) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |depth| {
                Some(depth.saturating_sub(1))
            });
    }
}

pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
    depth: QueueDepth,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            depth: self.depth.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Waits for room, then enqueues. Fails only once every receiver is gone.
    pub async fn send(&self, item: T) -> Result<(), SendError<T>> {
        let Ok(permit) = self.tx.reserve().await else {
            return Err(SendError(item));
        };
        // Counted before it becomes visible to a receiver.
        self.depth.increment();
        permit.send(item);
        Ok(())
    }

    pub fn depth(&self) -> QueueDepth {
        self.depth.clone()
    }
}

pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
    depth: QueueDepth,
}

impl<T> QueueReceiver<T> {
    /// `None` once the queue is empty and every sender has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await?;
        self.depth.decrement();
        Some(item)
    }

    /// Closes the queue to producers and discards what is left in it.
    pub fn close_and_drain(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0usize;
        loop {
            match self.rx.try_recv() {
                Ok(_) => {
                    self.depth.decrement();
                    dropped += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        dropped
    }

    pub fn depth(&self) -> QueueDepth {
        self.depth.clone()
    }

    /// Shares this receiver between several consumers.
    pub fn into_shared(self) -> SharedReceiver<T> {
        SharedReceiver {
            depth: self.depth.clone(),
            inner: Arc::new(Mutex::new(self)),
        }
    }
}

/// Multi-consumer handle: consumers take turns awaiting the next item.
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<QueueReceiver<T>>>,
    depth: QueueDepth,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            depth: self.depth.clone(),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }

    pub async fn close_and_drain(&self) -> usize {
        self.inner.lock().await.close_and_drain()
    }

    pub fn depth(&self) -> QueueDepth {
        self.depth.clone()
    }
}

/// Creates a bounded queue.
///
/// # Panics
///
/// Panics if `capacity` is zero (same contract as `tokio::sync::mpsc::channel`).
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let depth = QueueDepth {
        depth: Arc::new(AtomicUsize::new(0)),
        capacity,
    };
    (
        QueueSender {
            tx,
            depth: depth.clone(),
        },
        QueueReceiver { rx, depth },
    )
}
