//! Diagnostic poller

use std::sync::Arc;
use std::time::Duration;

use carbuddy_core::LinkState;
use carbuddy_obd::QueryResponse;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::health::HealthCounters;
use crate::supervisor::{shutdown_requested, PollFailure, QueryHandle};
use crate::tracker::CodeTracker;

/// Queries trouble codes on a fixed interval while the vehicle is ready
pub struct Poller {
    handle: QueryHandle,
    state_rx: watch::Receiver<LinkState>,
    tracker: Arc<CodeTracker>,
    dispatcher: Dispatcher,
    interval: Duration,
    health: Arc<HealthCounters>,
}

impl Poller {
    pub fn new(
        handle: QueryHandle,
        state_rx: watch::Receiver<LinkState>,
        tracker: Arc<CodeTracker>,
        dispatcher: Dispatcher,
        interval: Duration,
        health: Arc<HealthCounters>,
    ) -> Self {
        Self {
            handle,
            state_rx,
            tracker,
            dispatcher,
            interval,
            health,
        }
    }

    /// Poll until shutdown; the dispatcher is dropped on return
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Poller started");

        loop {
            tokio::select! {
                ready = self.state_rx.wait_for(|s| s.can_poll()) => {
                    if ready.is_err() {
                        break;
                    }
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let stopping = loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_requested(&mut shutdown) => break true,
                    left = self.state_rx.wait_for(|s| !s.can_poll()) => {
                        if left.is_err() {
                            break true;
                        }
                        break false;
                    }
                }

                if !self.poll_once().await {
                    // Supervisor takes over; resume once it reports ready again
                    tokio::select! {
                        left = self.state_rx.wait_for(|s| !s.can_poll()) => {
                            break left.is_err();
                        }
                        _ = shutdown_requested(&mut shutdown) => break true,
                    }
                }
            };

            if stopping {
                break;
            }
        }

        info!("Poller stopped");
    }

    /// One tick: query, track, dispatch. Returns false if the poll failed.
    async fn poll_once(&mut self) -> bool {
        let failure = match self.handle.query_trouble_codes().await {
            Ok(QueryResponse::TroubleCodes(raw)) => {
                let now = Utc::now();
                let delta = self.tracker.update(&raw, now);
                self.health.record_poll(now);

                if !delta.is_empty() {
                    let enqueued = self.dispatcher.dispatch(&delta, now);
                    info!(
                        appeared = delta.appeared.len(),
                        cleared = delta.cleared.len(),
                        enqueued,
                        "Trouble codes changed"
                    );
                } else {
                    debug!(active = self.tracker.snapshot().len(), "No code changes");
                }
                return true;
            }
            Ok(QueryResponse::NoVehicleLink(reason)) => PollFailure::NoVehicle(reason),
            Ok(other) => PollFailure::Unexpected(format!("{:?}", other)),
            Err(e) => PollFailure::Link(e),
        };

        warn!(%failure, "Trouble code poll failed");
        self.handle.report_failure(failure);
        false
    }
}
