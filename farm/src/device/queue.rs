//! Per-device FIFO work queue.
//!
//! A single worker task drains an unbounded channel, running one task at a
//! time in submission order. Each task settles its own [`Ticket`]; an error or
//! a panic in one task never reaches the next one.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, Instrument, Span};

use crate::errors::FarmError;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Pending result of a task submitted to a [`DeviceQueue`].
///
/// Dropping the ticket does not cancel the task.
pub struct Ticket<T> {
    device_id: String,
    rx: oneshot::Receiver<Result<T, FarmError>>,
}

impl<T> Future for Ticket<T> {
    type Output = Result<T, FarmError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|res| match res {
            Ok(result) => result,
            // The job was dropped unstarted, which only happens on disposal
            Err(_) => Err(FarmError::Disposed(this.device_id.clone())),
        })
    }
}

struct Shared {
    disposed: AtomicBool,
    pending: AtomicUsize,
}

/// Strict single-flight executor bound to one device
pub struct DeviceQueue {
    device_id: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    shared: Arc<Shared>,
}

impl DeviceQueue {
    /// Create the queue and spawn its worker on the current runtime.
    pub fn new(device_id: impl Into<String>, span: Span) -> Self {
        let device_id = device_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            disposed: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
        });

        tokio::spawn(worker(rx, shared.clone()).instrument(span));

        Self {
            device_id,
            tx: Mutex::new(Some(tx)),
            shared,
        }
    }

    /// Submit a task. It starts only after every earlier task has settled.
    ///
    /// Fails immediately with [`FarmError::Disposed`] once the queue is disposed.
    pub fn enqueue<T, F, Fut>(&self, task: F) -> Result<Ticket<T>, FarmError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FarmError>> + Send + 'static,
    {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let sender = match guard.as_ref() {
            Some(sender) if !self.shared.disposed.load(Ordering::SeqCst) => sender,
            _ => return Err(FarmError::Disposed(self.device_id.clone())),
        };

        let (result_tx, result_rx) = oneshot::channel();
        let device_id = self.device_id.clone();
        let job: Job = Box::pin(async move {
            // Call the closure inside the guard so a panic before the first poll is caught too
            let result = match AssertUnwindSafe(async move { task().await }).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    error!("Task panicked on device {}", device_id);
                    Err(FarmError::Internal(format!("task panicked on device {device_id}")))
                }
            };
            let _ = result_tx.send(result);
        });

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(job).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(FarmError::Disposed(self.device_id.clone()));
        }

        Ok(Ticket {
            device_id: self.device_id.clone(),
            rx: result_rx,
        })
    }

    /// Tasks submitted but not yet finished, including the running one
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Refuse further submissions and drop queued tasks that have not started.
    /// A task that is already running completes normally.
    pub fn dispose(&self) {
        self.shared.disposed.store(true, Ordering::SeqCst);
        let mut guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        guard.take();
    }
}

impl Drop for DeviceQueue {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn worker(mut rx: mpsc::UnboundedReceiver<Job>, shared: Arc<Shared>) {
    while let Some(job) = rx.recv().await {
        if shared.disposed.load(Ordering::SeqCst) {
            drop(job);
        } else {
            job.await;
        }
        shared.pending.fetch_sub(1, Ordering::SeqCst);
    }
    debug!("Device queue worker stopped");
}
