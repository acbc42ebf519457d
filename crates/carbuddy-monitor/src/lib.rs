//! carbuddy-monitor - Supervision, polling, tracking and dispatch
//!
//! Wires an [`AdapterLink`] to an [`EventSink`] through three tasks:
//!
//! ```text
//!  ┌────────────┐ LinkState (watch) ┌──────────┐  CodeDelta  ┌────────────┐
//!  │ Supervisor │──────────────────▶│  Poller  │────────────▶│ Dispatcher │
//!  │ (owns link)│◀──────────────────│ (ticks)  │  bounded    │  (queue)   │
//!  └────────────┘  poll failures    └──────────┘  mpsc       └─────┬──────┘
//!                                        │                         │
//!                                  CodeTracker               DispatchWorker
//!                                  (Arc snapshot)            ──▶ EventSink
//! ```
//!
//! Shutdown order: poller stops, supervisor disconnects the link, the queue is
//! closed and the worker drains it within the flush timeout.

pub mod backoff;
pub mod config;
pub mod dispatcher;
pub mod health;
pub mod poller;
pub mod supervisor;
pub mod tracker;

pub use backoff::Backoff;
pub use config::{ConfigError, DispatchConfig, MonitorConfig};
pub use dispatcher::{DispatchWorker, Dispatcher};
pub use health::{HealthCounters, MonitorHandle};
pub use poller::Poller;
pub use supervisor::{PollFailure, QueryHandle, Supervisor};
pub use tracker::{ActiveCodeSet, CodeDelta, CodeTracker};

use std::sync::Arc;
use std::time::Duration;

use carbuddy_core::{DeviceContext, EventSink};
use carbuddy_obd::AdapterLink;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

/// A fully wired monitoring pipeline, ready to run
pub struct Monitor {
    supervisor: Supervisor,
    poller: Poller,
    worker: DispatchWorker,
    flush_timeout: Duration,
    handle: MonitorHandle,
}

impl Monitor {
    /// Validate configuration and build the pipeline
    pub fn new(
        link: Arc<dyn AdapterLink>,
        sink: Arc<dyn EventSink>,
        config: MonitorConfig,
        dispatch: DispatchConfig,
        device: DeviceContext,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        dispatch.validate()?;

        let health = Arc::new(HealthCounters::default());
        let device = Arc::new(RwLock::new(device));
        let tracker = Arc::new(CodeTracker::new(config.severity.clone()));
        let poll_interval = config.poll_interval();

        let (supervisor, query_handle, state_rx) =
            Supervisor::new(link, config, health.clone(), device.clone());
        let (dispatcher, worker) = Dispatcher::new(&dispatch, sink, device.clone(), health.clone());
        let poller = Poller::new(
            query_handle,
            state_rx.clone(),
            tracker.clone(),
            dispatcher,
            poll_interval,
            health.clone(),
        );
        let handle = MonitorHandle::new(state_rx, health, tracker, device);

        Ok(Self {
            supervisor,
            poller,
            worker,
            flush_timeout: dispatch.flush_timeout(),
            handle,
        })
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Run until `shutdown` flips to true, then shut down in order
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let Self {
            mut supervisor,
            poller,
            worker,
            flush_timeout,
            handle,
        } = self;

        let mut worker_task = tokio::spawn(worker.run());
        let poller_task = tokio::spawn(poller.run(shutdown.clone()));
        let supervisor_task = tokio::spawn(async move {
            supervisor.run(shutdown).await;
            supervisor
        });

        // The poller finishes any in-flight query before it returns
        if let Err(e) = poller_task.await {
            warn!(%e, "Poller task failed");
        }

        match supervisor_task.await {
            Ok(mut supervisor) => supervisor.shutdown().await,
            Err(e) => warn!(%e, "Supervisor task failed"),
        }

        // Poller (sole queue producer) is gone, so the queue is closed
        match tokio::time::timeout(flush_timeout, &mut worker_task).await {
            Ok(_) => {}
            Err(_) => {
                worker_task.abort();
                let _ = worker_task.await;
                let lost = handle.counters().abandon_pending();
                warn!(lost, "Flush timeout reached, undelivered events dropped");
            }
        }

        let snapshot = handle.snapshot();
        info!(
            delivered = snapshot.events_delivered,
            dropped = snapshot.events_dropped,
            reconnects = snapshot.reconnects,
            "Monitor stopped"
        );
    }
}
