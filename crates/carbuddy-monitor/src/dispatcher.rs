//! Event dispatcher: bounded outbound queue and retrying delivery worker

use std::sync::Arc;

use carbuddy_core::{DeviceContext, EventSink, ReportableEvent, SinkError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::DispatchConfig;
use crate::health::HealthCounters;
use crate::tracker::CodeDelta;

/// Producer side: turns deltas into events and enqueues them without blocking
pub struct Dispatcher {
    tx: mpsc::Sender<ReportableEvent>,
    report_resolved: bool,
    device: Arc<RwLock<DeviceContext>>,
    health: Arc<HealthCounters>,
}

impl Dispatcher {
    /// Create the dispatcher and its delivery worker
    pub fn new(
        config: &DispatchConfig,
        sink: Arc<dyn EventSink>,
        device: Arc<RwLock<DeviceContext>>,
        health: Arc<HealthCounters>,
    ) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = DispatchWorker {
            rx,
            sink,
            config: config.clone(),
            health: health.clone(),
        };
        let dispatcher = Self {
            tx,
            report_resolved: config.report_resolved,
            device,
            health,
        };
        (dispatcher, worker)
    }

    /// Enqueue the events for one poll's delta; returns how many were accepted
    pub fn dispatch(&self, delta: &CodeDelta, detected_at: DateTime<Utc>) -> usize {
        let device = self.device.read().clone();
        let mut accepted = 0;

        for code in &delta.appeared {
            let event = ReportableEvent::appeared(code, detected_at, device.clone());
            if self.enqueue(event) {
                accepted += 1;
            }
        }

        if self.report_resolved {
            for code in &delta.cleared {
                let event = ReportableEvent::resolved(code, detected_at, device.clone());
                if self.enqueue(event) {
                    accepted += 1;
                }
            }
        }

        accepted
    }

    /// Non-blocking enqueue; when the queue is full the new event is dropped
    pub fn enqueue(&self, event: ReportableEvent) -> bool {
        let code = event.code().clone();
        let kind = event.kind();
        match self.tx.try_send(event) {
            Ok(()) => {
                self.health.record_enqueued();
                debug!(%code, %kind, "Event enqueued");
                true
            }
            Err(TrySendError::Full(_)) => {
                self.health.record_overflow();
                warn!(
                    %code,
                    %kind,
                    dropped = self.health.dropped_overflow(),
                    "Outbound queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.health.record_overflow();
                warn!(%code, %kind, "Outbound queue closed, dropping event");
                false
            }
        }
    }
}

/// Consumer side: submits queued events to the sink
pub struct DispatchWorker {
    rx: mpsc::Receiver<ReportableEvent>,
    sink: Arc<dyn EventSink>,
    config: DispatchConfig,
    health: Arc<HealthCounters>,
}

impl DispatchWorker {
    /// Deliver events until every `Dispatcher` is dropped and the queue is empty
    pub async fn run(mut self) {
        info!(sink = %self.sink.name(), "Dispatch worker started");
        while let Some(event) = self.rx.recv().await {
            self.health.record_dequeued();
            self.deliver(event).await;
        }
        info!(sink = %self.sink.name(), "Dispatch worker drained");
    }

    async fn deliver(&self, event: ReportableEvent) {
        let mut backoff = Backoff::new(self.config.retry_initial(), self.config.retry_max());
        let mut retries = 0u32;

        loop {
            match self.sink.submit(&event).await {
                Ok(()) => {
                    self.health.record_delivered();
                    info!(
                        event_id = %event.id(),
                        code = %event.code(),
                        kind = %event.kind(),
                        severity = %event.severity(),
                        retries,
                        "Event delivered"
                    );
                    return;
                }
                Err(SinkError::Permanent(reason)) => {
                    self.health.record_rejected();
                    warn!(
                        event_id = %event.id(),
                        code = %event.code(),
                        %reason,
                        "Sink rejected event, dropping"
                    );
                    return;
                }
                Err(SinkError::Transient(reason)) if retries >= self.config.max_retries => {
                    self.health.record_retries_exhausted();
                    warn!(
                        event_id = %event.id(),
                        code = %event.code(),
                        retries,
                        %reason,
                        "Retry budget exhausted, dropping event"
                    );
                    return;
                }
                Err(SinkError::Transient(reason)) => {
                    retries += 1;
                    let delay = backoff.next_delay();
                    debug!(
                        code = %event.code(),
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "Transient sink failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
