//! Health counters shared by the monitor tasks

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use carbuddy_core::{DeviceContext, HealthSnapshot, LinkState};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::tracker::{ActiveCodeSet, CodeTracker};

/// Lock-free counters updated by the supervisor, poller and dispatcher
#[derive(Debug, Default)]
pub struct HealthCounters {
    reconnects: AtomicU64,
    backoff_attempt: AtomicU32,
    last_poll_at: RwLock<Option<DateTime<Utc>>>,
    events_enqueued: AtomicU64,
    events_delivered: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_retries: AtomicU64,
    dropped_rejected: AtomicU64,
    dropped_shutdown: AtomicU64,
    queue_depth: AtomicUsize,
    in_flight: AtomicUsize,
}

impl HealthCounters {
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_backoff_attempt(&self, attempt: u32) {
        self.backoff_attempt.store(attempt, Ordering::Relaxed);
    }

    pub fn record_poll(&self, at: DateTime<Utc>) {
        *self.last_poll_at.write() = Some(at);
    }

    pub fn record_enqueued(&self) {
        self.events_enqueued.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    /// Worker took an event off the queue
    pub fn record_dequeued(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_overflow(&self) {
        self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retries_exhausted(&self) {
        self.dropped_retries.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.dropped_rejected.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Count everything still queued or in flight as lost; returns the count
    pub fn abandon_pending(&self) -> u64 {
        let pending = self.queue_depth.swap(0, Ordering::Relaxed)
            + self.in_flight.swap(0, Ordering::Relaxed);
        self.dropped_shutdown
            .fetch_add(pending as u64, Ordering::Relaxed);
        pending as u64
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn events_enqueued(&self) -> u64 {
        self.events_enqueued.load(Ordering::Relaxed)
    }

    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_overflow(&self) -> u64 {
        self.dropped_overflow.load(Ordering::Relaxed)
    }

    pub fn dropped_retries(&self) -> u64 {
        self.dropped_retries.load(Ordering::Relaxed)
    }

    pub fn dropped_rejected(&self) -> u64 {
        self.dropped_rejected.load(Ordering::Relaxed)
    }

    pub fn dropped_shutdown(&self) -> u64 {
        self.dropped_shutdown.load(Ordering::Relaxed)
    }

    /// All dropped events regardless of cause
    pub fn events_dropped(&self) -> u64 {
        self.dropped_overflow()
            + self.dropped_retries()
            + self.dropped_rejected()
            + self.dropped_shutdown()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, link_state: LinkState, active_codes: usize) -> HealthSnapshot {
        HealthSnapshot {
            link_state,
            last_poll_at: *self.last_poll_at.read(),
            active_codes,
            reconnects: self.reconnects(),
            backoff_attempt: self.backoff_attempt.load(Ordering::Relaxed),
            events_enqueued: self.events_enqueued(),
            events_delivered: self.events_delivered(),
            events_dropped: self.events_dropped(),
            queue_depth: self.queue_depth(),
        }
    }
}

/// Read-only view of a running monitor
#[derive(Clone)]
pub struct MonitorHandle {
    state_rx: watch::Receiver<LinkState>,
    health: Arc<HealthCounters>,
    tracker: Arc<CodeTracker>,
    device: Arc<RwLock<DeviceContext>>,
}

impl MonitorHandle {
    pub(crate) fn new(
        state_rx: watch::Receiver<LinkState>,
        health: Arc<HealthCounters>,
        tracker: Arc<CodeTracker>,
        device: Arc<RwLock<DeviceContext>>,
    ) -> Self {
        Self {
            state_rx,
            health,
            tracker,
            device,
        }
    }

    pub fn link_state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every link state change
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    pub fn active_codes(&self) -> Arc<ActiveCodeSet> {
        self.tracker.snapshot()
    }

    pub fn device(&self) -> DeviceContext {
        self.device.read().clone()
    }

    pub fn counters(&self) -> &HealthCounters {
        &self.health
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.health
            .snapshot(self.link_state(), self.tracker.snapshot().len())
    }
}
