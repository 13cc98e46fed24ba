//! Alert delivery off the caller's thread.
//!
//! [`QueuedAlertSink`] hands each request to a worker thread through a
//! bounded queue and returns at once, so a slow transport never holds up the
//! session that raised the alert. A full queue drops the request and counts
//! it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use crate::error::RuntimeError;

use super::traits::{AlertRequest, AlertSink};

const THREAD_NAME: &str = "ferrywatch-alerts";

/// Wraps another [`AlertSink`] and delivers through it on a worker thread.
///
/// Dropping the sink delivers whatever is still queued, then joins the
/// worker.
#[derive(Debug)]
pub struct QueuedAlertSink {
    tx: Sender<AlertRequest>,
    dropped: AtomicU64,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedAlertSink {
    /// Starts the delivery worker. `capacity` is clamped to at least one.
    ///
    /// # Errors
    ///
    /// `RuntimeError::Spawn` if the thread cannot be created.
    pub fn spawn(inner: Arc<dyn AlertSink>, capacity: usize) -> Result<Self, RuntimeError> {
        let (tx, rx) = bounded::<AlertRequest>(capacity.max(1));
        let join = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || deliver_loop(inner.as_ref(), &rx))
            .map_err(|e| RuntimeError::Spawn {
                name: THREAD_NAME.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            tx,
            dropped: AtomicU64::new(0),
            join: Mutex::new(Some(join)),
        })
    }

    /// Requests discarded because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AlertSink for QueuedAlertSink {
    fn dispatch(&self, request: &AlertRequest) {
        match self.tx.try_send(request.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(req) | TrySendError::Disconnected(req)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(channel = ?req.channel(), "alert queue unavailable; request dropped");
            }
        }
    }
}

impl Drop for QueuedAlertSink {
    fn drop(&mut self) {
        let (dummy_tx, _) = bounded::<AlertRequest>(1);
        drop(std::mem::replace(&mut self.tx, dummy_tx));

        let handle = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("alert worker panicked");
            }
        }
    }
}

fn deliver_loop(inner: &dyn AlertSink, rx: &Receiver<AlertRequest>) {
    while let Ok(request) = rx.recv() {
        inner.dispatch(&request);
    }
    debug!("alert worker exiting");
}
