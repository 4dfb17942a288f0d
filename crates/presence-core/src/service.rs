//! Presence service
//!
//! Owns both registries, the dispatcher worker and the sweep task, and
//! enforces their ordering:
//!
//! - **Startup**: restore both registries, then start the dispatcher and
//!   the sweeper. Ingestion is expected only after [`PresenceService::start`]
//!   returns.
//! - **Shutdown**: stop the sweeper, stop the dispatcher (queued
//!   notifications are discarded), then snapshot both registries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::dispatcher::{DispatchWorker, DispatcherHandle, NotificationDispatcher};
use crate::model::{Complex, ComplexInfo};
use crate::registry::{HeartbeatRegistry, PushRegistry, SWEEP_PERIOD};
use crate::schedule::ScheduleIndex;
use crate::traits::{Notifier, SnapshotStore};

struct SweeperHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Running presence monitor
pub struct PresenceService {
    heartbeat: Arc<HeartbeatRegistry>,
    push: Arc<PushRegistry>,
    dispatcher: NotificationDispatcher,
    worker: Option<DispatchWorker>,
    dispatcher_handle: Option<DispatcherHandle>,
    sweeper: Option<SweeperHandle>,
    sweep_period: Duration,
}

impl PresenceService {
    /// Wire a service from validated configuration
    ///
    /// Nothing runs until [`start`](Self::start) is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: MonitorConfig,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn SnapshotStore>,
        schedule: Arc<ScheduleIndex>,
    ) -> crate::Result<Self> {
        config.validate()?;
        let tz = config.timezone()?;

        let (dispatcher, worker) =
            NotificationDispatcher::new(notifier, config.dispatcher.queue_capacity);

        let heartbeat = HeartbeatRegistry::new(
            config.complexes.clone(),
            Arc::new(dispatcher.clone()),
            store.clone(),
            schedule,
        )
        .with_timezone(tz);

        let push = PushRegistry::new(config.complexes, Arc::new(dispatcher.clone()), store)
            .with_timezone(tz);

        Ok(Self {
            heartbeat: Arc::new(heartbeat),
            push: Arc::new(push),
            dispatcher,
            worker: Some(worker),
            dispatcher_handle: None,
            sweeper: None,
            sweep_period: SWEEP_PERIOD,
        })
    }

    /// Override the sweep period
    pub fn with_sweep_period(mut self, period: Duration) -> Self {
        self.sweep_period = period;
        self
    }

    /// Restore both registries, then start background tasks
    ///
    /// Calling this more than once has no further effect.
    pub async fn start(&mut self) {
        let Some(worker) = self.worker.take() else {
            warn!("Presence service already started");
            return;
        };

        self.heartbeat.restore().await;
        self.push.restore().await;

        self.dispatcher_handle = Some(worker.spawn());

        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(self.heartbeat.clone().run_sweeper(self.sweep_period, stop_rx));
        self.sweeper = Some(SweeperHandle { stop_tx, join });

        info!("Presence service started");
    }

    /// Heartbeat registry
    pub fn heartbeat(&self) -> &Arc<HeartbeatRegistry> {
        &self.heartbeat
    }

    /// Push registry
    pub fn push(&self) -> &Arc<PushRegistry> {
        &self.push
    }

    /// Enqueue side of the dispatcher
    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Status text for a complex, served by the push registry when the
    /// complex is direct-wired and by the heartbeat registry otherwise
    pub async fn status_text(&self, complex_key: &str) -> String {
        match self.heartbeat.complex(complex_key).await {
            Some(complex) if complex.direct_wire => self.push.status_text(complex_key).await,
            Some(_) => self.heartbeat.status_text(complex_key).await,
            None => String::new(),
        }
    }

    /// Heartbeat status report
    pub async fn status_report(&self) -> Vec<ComplexInfo> {
        self.heartbeat.status_report().await
    }

    /// Set a push device's notification switch
    pub async fn update_notification(&self, device_id: &str, enabled: bool) -> bool {
        self.push.update_notification(device_id, enabled).await
    }

    /// Replace the complex set in both registries
    pub async fn update_complexes(&self, complexes: Vec<Complex>) {
        self.heartbeat.update_complexes(complexes.clone()).await;
        self.push.update_complexes(complexes).await;
        info!("Complex configuration updated");
    }

    /// Stop background tasks and take final snapshots
    pub async fn shutdown(mut self) {
        info!("Shutting down presence service");

        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.stop_tx.send(());
            if let Err(e) = sweeper.join.await {
                warn!("Sweeper task failed: {}", e);
            }
        }

        if let Some(handle) = self.dispatcher_handle.take() {
            handle.stop().await;
        }

        self.heartbeat.snapshot().await;
        self.push.snapshot().await;

        info!("Presence service stopped");
    }
}
