//! Integration tests for the CarBuddy monitor
//!
//! Shared fixtures for the tests under `tests/`:
//! - `pipeline_test.rs` - full pipeline against the mock adapter, paused clock
//! - `elm327_e2e_test.rs` - ELM327 over TCP to a fake Sentry over HTTP
//!
//! Mock endpoint names must be unique per test because endpoint leases are
//! process-wide.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carbuddy_core::{DeviceContext, EventKind, EventSink, ReportableEvent, SinkResult};
use carbuddy_monitor::{DispatchConfig, Monitor, MonitorConfig, MonitorHandle};
use carbuddy_obd::{MockAdapterLink, MockConfig};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Sink that records every submission and plays back scripted outcomes
#[derive(Default)]
pub struct RecordingSink {
    outcomes: Mutex<VecDeque<SinkResult>>,
    submissions: Mutex<Vec<ReportableEvent>>,
    delivered: Mutex<Vec<ReportableEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_outcomes(outcomes: Vec<SinkResult>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        })
    }

    /// Every attempt, including failed ones
    pub fn submissions(&self) -> usize {
        self.submissions.lock().len()
    }

    /// Acknowledged events in delivery order
    pub fn delivered(&self) -> Vec<ReportableEvent> {
        self.delivered.lock().clone()
    }

    /// `(kind, code)` pairs of acknowledged events
    pub fn transitions(&self) -> Vec<(EventKind, String)> {
        self.delivered
            .lock()
            .iter()
            .map(|e| (e.kind(), e.code().to_string()))
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn submit(&self, event: &ReportableEvent) -> SinkResult {
        self.submissions.lock().push(event.clone());
        let outcome = self.outcomes.lock().pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            self.delivered.lock().push(event.clone());
        }
        outcome
    }
}

pub fn mock_link(name: &str, codes: &[&str]) -> Arc<MockAdapterLink> {
    Arc::new(MockAdapterLink::new(&MockConfig {
        name: name.to_string(),
        codes: codes.iter().map(|c| c.to_string()).collect(),
        vin: Some("1HGCM82633A004352".to_string()),
        ..Default::default()
    }))
}

/// Monitor settings with short, round intervals
pub fn monitor_config(poll_interval_secs: u64) -> MonitorConfig {
    MonitorConfig {
        poll_interval_secs,
        initial_backoff_ms: 1_000,
        max_backoff_ms: 8_000,
        verify_retry_limit: 3,
        verify_interval_secs: 5,
        connect_timeout_ms: 5_000,
        command_timeout_ms: 5_000,
        ..Default::default()
    }
}

pub fn device() -> DeviceContext {
    DeviceContext {
        device_id: "cb-itest".to_string(),
        application: Some("carbuddy".to_string()),
        ..Default::default()
    }
}

/// A monitor running on its own task
pub struct RunningMonitor {
    pub handle: MonitorHandle,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RunningMonitor {
    pub fn start(monitor: Monitor) -> Self {
        let handle = monitor.handle();
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(monitor.run(rx));
        Self {
            handle,
            shutdown,
            task,
        }
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Request shutdown and wait for the pipeline to stop
    pub async fn stop(self) {
        self.request_shutdown();
        self.task.await.unwrap();
    }

    pub async fn join(self) {
        self.task.await.unwrap();
    }
}

/// Build and start a monitor over a mock link with default dispatch settings
pub fn start_monitor(
    link: Arc<MockAdapterLink>,
    sink: Arc<RecordingSink>,
    config: MonitorConfig,
) -> RunningMonitor {
    start_monitor_with(link, sink, config, DispatchConfig::default())
}

pub fn start_monitor_with(
    link: Arc<MockAdapterLink>,
    sink: Arc<RecordingSink>,
    config: MonitorConfig,
    dispatch: DispatchConfig,
) -> RunningMonitor {
    let monitor = Monitor::new(link, sink, config, dispatch, device()).unwrap();
    RunningMonitor::start(monitor)
}

/// Poll `cond` every 10ms until it holds or `limit` elapses
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
