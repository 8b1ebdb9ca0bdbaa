//! Single-worker update serialization.
//!
//! Every mutation of a transformer's cache and style state travels through
//! an [`UpdateSerializer`] as a typed task. Tasks are carried over an
//! unbounded channel to a single worker, so mutations are totally ordered
//! by arrival and never race. Submission never blocks the caller.
//!
//! Shutdown is drain-then-close: tasks enqueued before [`close`] still run;
//! tasks submitted afterwards are silently dropped, since by that point no
//! external observer expects delivery.
//!
//! [`close`]: UpdateSerializer::close

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::trace;

/// Sender half of a transformer's single-worker task queue.
///
/// The paired receiver is consumed by the transformer's worker loop; see
/// [`crate::transformer`].
pub struct UpdateSerializer<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    submitted: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Send + 'static> UpdateSerializer<T> {
    /// Create a serializer and the receiver its worker will drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
                submitted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Enqueue a task for the worker.
    ///
    /// Returns `false` if the queue has been closed; the task is dropped
    /// silently in that case.
    pub fn submit(&self, task: T) -> bool {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match tx.as_ref() {
            Some(tx) if tx.send(task).is_ok() => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            _ => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("task dropped: update queue closed");
                false
            }
        }
    }

    /// Close the queue to further submissions.
    ///
    /// Already-enqueued tasks still drain; the worker loop ends once the
    /// queue is empty.
    pub fn close(&self) {
        let mut tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        if tx.take().is_some() {
            trace!("update queue closed");
        }
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Number of tasks accepted since creation.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Number of tasks dropped after close.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
