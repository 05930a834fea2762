//! Background notification worker.
//!
//! A [`Notifier`] moves notify passes off the publishing thread. Payloads are
//! enqueued on a bounded channel and a dedicated worker thread runs
//! [`Registry::notify_each`] for each one, in the order they were posted.
//!
//! ```text
//! post(payload) ──► [bounded queue] ──► weakpub-notifier ──► registry.notify_each(deliver)
//!                                                       └─► panic caught and logged per subscriber
//! ```
//!
//! The worker only holds a weak reference to its registry. It notices a
//! dropped registry when the next payload arrives: that payload and any still
//! queued are counted as dropped and the worker exits. Until then it stays
//! parked on the queue. Closing the notifier ends it as well.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use log::{error, warn};

use crate::error::{ExecutionError, WeakPubResult};
use crate::registry::Registry;

const QUEUE_PATH: &str = "notifier";

/// Handle to a background notification worker.
pub struct Notifier<P: Send + Sync + 'static> {
    tx: Option<Sender<P>>,
    worker: Option<JoinHandle<()>>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
    panics: Arc<AtomicU64>,
}

impl<P: Send + Sync + 'static> Notifier<P> {
    /// Spawns a worker that delivers each posted payload to every live
    /// subscriber of `registry` through `deliver`.
    ///
    /// The queue capacity comes from the registry's `notifier_capacity`.
    pub fn spawn<S, D>(registry: &Arc<Registry<S>>, deliver: D) -> WeakPubResult<Self>
    where
        S: ?Sized + Send + Sync + 'static,
        D: Fn(&S, &P) + Send + Sync + 'static,
    {
        let capacity = registry.config().notifier_capacity.max(1);
        let (tx, rx) = bounded::<P>(capacity);

        let dropped = Arc::new(AtomicU64::new(0));
        let panics = Arc::new(AtomicU64::new(0));

        let weak = Arc::downgrade(registry);
        let thread_dropped = Arc::clone(&dropped);
        let thread_panics = Arc::clone(&panics);
        let worker = thread::Builder::new()
            .name("weakpub-notifier".to_string())
            .spawn(move || worker_loop(&weak, &deliver, &rx, &thread_dropped, &thread_panics))
            .map_err(|e| ExecutionError::SpawnFailed {
                message: e.to_string(),
            })?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            capacity,
            dropped,
            panics,
        })
    }

    /// Enqueues a payload without blocking.
    ///
    /// # Errors
    /// - `QueueFull` if the queue is at capacity (retryable)
    /// - `Disconnected` if the worker has exited
    pub fn post(&self, payload: P) -> WeakPubResult<()> {
        let tx = self.sender()?;
        tx.try_send(payload).map_err(|err| match err {
            TrySendError::Full(_) => ExecutionError::QueueFull {
                path: QUEUE_PATH.to_string(),
                capacity: self.capacity,
            }
            .into(),
            TrySendError::Disconnected(_) => disconnected(),
        })
    }

    /// Enqueues a payload, waiting up to `timeout` for queue capacity.
    pub fn post_timeout(&self, payload: P, timeout: Duration) -> WeakPubResult<()> {
        let tx = self.sender()?;
        tx.send_timeout(payload, timeout).map_err(|err| match err {
            SendTimeoutError::Timeout(_) => ExecutionError::QueueFull {
                path: QUEUE_PATH.to_string(),
                capacity: self.capacity,
            }
            .into(),
            SendTimeoutError::Disconnected(_) => disconnected(),
        })
    }

    /// Payloads waiting in the queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tx.as_ref().map_or(0, Sender::len)
    }

    /// Queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Payloads discarded because the registry was gone.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Subscriber callbacks that panicked on the worker.
    #[must_use]
    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Closes the queue and waits for the worker to deliver what is pending.
    pub fn shutdown(mut self) {
        self.close_and_join();
    }

    fn sender(&self) -> WeakPubResult<&Sender<P>> {
        self.tx.as_ref().ok_or_else(disconnected)
    }

    fn close_and_join(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.worker.take() {
            // The worker is never the current thread unless a callback drops
            // its own notifier; joining then would never return.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl<P: Send + Sync + 'static> Drop for Notifier<P> {
    fn drop(&mut self) {
        self.close_and_join();
    }
}

impl<P: Send + Sync + 'static> std::fmt::Debug for Notifier<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("capacity", &self.capacity)
            .field("pending", &self.pending())
            .field("dropped", &self.dropped())
            .field("panics", &self.panics())
            .finish()
    }
}

fn disconnected() -> crate::error::WeakPubError {
    ExecutionError::Disconnected {
        path: QUEUE_PATH.to_string(),
    }
    .into()
}

fn worker_loop<S, P, D>(
    registry: &Weak<Registry<S>>,
    deliver: &D,
    rx: &Receiver<P>,
    dropped: &AtomicU64,
    panics: &AtomicU64,
) where
    S: ?Sized + Send + Sync,
    P: Send + Sync,
    D: Fn(&S, &P) + Send + Sync,
{
    while let Ok(payload) = rx.recv() {
        let Some(registry) = registry.upgrade() else {
            let late = 1 + rx.try_iter().count() as u64;
            dropped.fetch_add(late, Ordering::Relaxed);
            warn!("notifier: registry dropped, discarding {late} payloads");
            break;
        };

        registry.notify_each(|subscriber| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| deliver(subscriber, &payload)));
            if let Err(cause) = outcome {
                panics.fetch_add(1, Ordering::Relaxed);
                error!(
                    "notifier: subscriber panicked in registry {}: {}",
                    registry.id(),
                    panic_message(cause.as_ref())
                );
            }
        });
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(s) = cause.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
