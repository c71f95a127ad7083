//! Bounded FIFO of pending URLs with backpressure and drain tracking.
//!
//! One producer enqueues; any number of workers dequeue. Every dequeued item
//! must be acknowledged with [`WorkQueue::task_done`], and [`WorkQueue::join`]
//! resolves only once all enqueued items were acknowledged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::{mpsc, watch, Semaphore};

use crate::types::WorkerId;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("work queue is closed")]
    Closed,
    #[error("task_done called more times than items were dequeued")]
    Unbalanced,
}

/// A URL taken off the queue by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub url: String,
    pub worker: WorkerId,
}

pub struct WorkQueue {
    capacity: usize,
    /// One permit per free slot; producers wait here when the queue is full.
    slots: Semaphore,
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    queued: AtomicUsize,
    unfinished: watch::Sender<usize>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let (unfinished, _) = watch::channel(0);
        Self {
            capacity,
            slots: Semaphore::new(capacity),
            sender: Mutex::new(Some(tx)),
            receiver: tokio::sync::Mutex::new(rx),
            queued: AtomicUsize::new(0),
            unfinished,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items currently buffered; never exceeds [`Self::capacity`].
    pub fn len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items enqueued but not yet acknowledged.
    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }

    /// Appends a URL, waiting while the queue is full. Cancel-safe: if the
    /// returned future is dropped before completion nothing was enqueued.
    pub async fn enqueue(&self, url: String) -> Result<(), QueueError> {
        let sender = self.current_sender()?;
        let permit = self.slots.acquire().await.map_err(|_| QueueError::Closed)?;
        // The slot is handed back by `dequeue`.
        permit.forget();
        self.unfinished.send_modify(|n| *n += 1);
        self.queued.fetch_add(1, Ordering::SeqCst);
        if sender.send(url).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            self.unfinished.send_modify(|n| *n -= 1);
            self.slots.add_permits(1);
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Waits for the next URL. Returns `None` once the queue is closed and empty.
    ///
    /// Cancel-safe, so it can race a cancellation signal in `select!`.
    pub async fn dequeue(&self, worker: WorkerId) -> Option<WorkItem> {
        let mut receiver = self.receiver.lock().await;
        let url = receiver.recv().await?;
        self.queued.fetch_sub(1, Ordering::SeqCst);
        self.slots.add_permits(1);
        Some(WorkItem { url, worker })
    }

    /// Acknowledges that one dequeued item has been fully handled.
    pub fn task_done(&self) -> Result<(), QueueError> {
        let mut balanced = true;
        self.unfinished.send_modify(|n| match n.checked_sub(1) {
            Some(next) => *n = next,
            None => balanced = false,
        });
        if balanced {
            Ok(())
        } else {
            Err(QueueError::Unbalanced)
        }
    }

    /// Marks the end of input. Buffered items are still delivered; afterwards
    /// every waiting consumer observes exhaustion.
    pub fn close_when_drained(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    /// Resolves once every enqueued item has been acknowledged.
    pub async fn join(&self) {
        let mut rx = self.unfinished.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn current_sender(&self) -> Result<mpsc::UnboundedSender<String>, QueueError> {
        self.sender
            .lock()
            .map_err(|_| QueueError::Closed)?
            .clone()
            .ok_or(QueueError::Closed)
    }
}
