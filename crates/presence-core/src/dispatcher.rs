//! Notification dispatcher
//!
//! A single bounded queue feeds one sequential sender task:
//!
//! ```text
//! registries ──notify()──▶ [ bounded mpsc queue ] ──▶ DispatchWorker ──▶ Notifier::send
//!             (backpressure)                          (one at a time)
//! ```
//!
//! ## Guarantees
//!
//! - Admission is decided once, at enqueue
//! - A full queue makes the caller wait; nothing is dropped on enqueue
//! - Sends happen strictly in enqueue order, never concurrently
//! - Send failures are logged and not retried (at-most-once)
//! - On stop, queued notifications are discarded, not flushed

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::model::Notification;
use crate::traits::{NotificationSink, Notifier};

/// Default queue capacity, sized for ingest bursts
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Enqueue side of the dispatcher
///
/// Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

/// Sending side of the dispatcher; owns the queue receiver
pub struct DispatchWorker {
    rx: mpsc::Receiver<Notification>,
    notifier: Arc<dyn Notifier>,
}

/// Handle to a running [`DispatchWorker`]
pub struct DispatcherHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<usize>,
}

impl NotificationDispatcher {
    /// Create a dispatcher and its worker
    ///
    /// # Parameters
    ///
    /// - `notifier`: External send capability
    /// - `capacity`: Queue capacity (at least 1)
    pub fn new(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, DispatchWorker { rx, notifier })
    }

    /// Queue a notification for delivery
    ///
    /// Waits while the queue is full.
    ///
    /// # Returns
    ///
    /// `true` if the notification was admitted and queued; `false` if the
    /// admission filter suppressed it or the worker has stopped.
    pub async fn enqueue(&self, notification: Notification) -> bool {
        if !notification.is_admitted() {
            debug!(
                "Notification for {} suppressed (complex {})",
                notification.device.id, notification.complex.key
            );
            return false;
        }

        match self.tx.send(notification).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(notification)) => {
                warn!(
                    "Dispatcher stopped, discarding notification for {}",
                    notification.device.id
                );
                false
            }
        }
    }
}

#[async_trait]
impl NotificationSink for NotificationDispatcher {
    async fn notify(&self, notification: Notification) {
        self.enqueue(notification).await;
    }
}

impl DispatchWorker {
    /// Run the worker on its own task
    pub fn spawn(self) -> DispatcherHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(self.run_with_shutdown(stop_rx));
        DispatcherHandle { stop_tx, join }
    }

    /// Deliver queued notifications until `shutdown_rx` fires
    ///
    /// # Returns
    ///
    /// The number of queued notifications discarded at shutdown.
    pub async fn run_with_shutdown(self, mut shutdown_rx: oneshot::Receiver<()>) -> usize {
        info!("Dispatcher started ({})", self.notifier.notifier_name());

        let notifier = self.notifier;
        let mut queue = ReceiverStream::new(self.rx);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => break,

                next = queue.next() => {
                    let Some(notification) = next else {
                        debug!("All dispatcher senders dropped");
                        break;
                    };

                    tokio::select! {
                        biased;

                        _ = &mut shutdown_rx => break,
                        _ = deliver(&*notifier, &notification) => {}
                    }
                }
            }
        }

        let mut rx = queue.into_inner();
        rx.close();

        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }

        if discarded > 0 {
            warn!("Dispatcher stopped, discarded {} queued notification(s)", discarded);
        }
        info!("Dispatcher stopped");

        discarded
    }
}

impl DispatcherHandle {
    /// Stop the worker and wait for it to exit
    ///
    /// # Returns
    ///
    /// The number of queued notifications discarded.
    pub async fn stop(self) -> usize {
        let _ = self.stop_tx.send(());

        match self.join.await {
            Ok(discarded) => discarded,
            Err(e) => {
                warn!("Dispatcher task failed: {}", e);
                0
            }
        }
    }
}

/// Send one notification to every channel of its complex, in order
async fn deliver(notifier: &dyn Notifier, notification: &Notification) {
    for channel in &notification.complex.channels {
        debug!("Sending '{}' to {}", notification.message, channel);

        if let Err(e) = notifier.send(&notification.message, *channel).await {
            warn!(
                "Failed to send notification for {} to {} via {}: {}",
                notification.device.id,
                channel,
                notifier.notifier_name(),
                e
            );
        }
    }
}
