//! Connection supervisor
//!
//! Sole owner of the adapter session and of the published [`LinkState`]:
//!
//! ```text
//!   Disconnected ──▶ Connecting ──ok──▶ LinkUp ──verified──▶ VehicleReady
//!        ▲               │                 │                    │
//!        │  fail+backoff │                 │ not verified       │ poll failure
//!        └───────────────┘                 ▼                    ▼
//!        ▲                              Degraded ◀──────────────┘
//!        │  retry limit / closed           │ verified
//!        └─────────────────────────────────┴──────────▶ VehicleReady
//! ```
//!
//! Link operations are never cancelled. Shutdown is only observed while the
//! supervisor is idle (backoff sleep, verify interval, waiting on the poller).

use std::sync::Arc;
use std::time::Duration;

use carbuddy_core::{DeviceContext, LinkState};
use carbuddy_obd::{AdapterLink, LinkError, QueryKind, QueryResponse};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::MonitorConfig;
use crate::health::HealthCounters;

/// Why a poll could not produce a code list
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollFailure {
    #[error("vehicle not responding: {0}")]
    NoVehicle(String),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// The poller's narrow view of the link: it may query codes and report
/// failures, but never connect or disconnect.
#[derive(Clone)]
pub struct QueryHandle {
    link: Arc<dyn AdapterLink>,
    command_timeout: Duration,
    failures: mpsc::Sender<PollFailure>,
}

impl QueryHandle {
    pub async fn query_trouble_codes(&self) -> Result<QueryResponse, LinkError> {
        self.link
            .send_query(QueryKind::QueryTroubleCodes, self.command_timeout)
            .await
    }

    /// Tell the supervisor the last poll failed
    pub fn report_failure(&self, failure: PollFailure) {
        if let Err(e) = self.failures.try_send(failure) {
            // A pending report already forces re-verification
            debug!(%e, "Poll failure report not queued");
        }
    }
}

/// Wait until shutdown is requested (or the signal source is gone)
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|&stop| stop).await;
}

/// Outcome of one verification attempt
enum Verified {
    Ready,
    Failed(String),
    SessionLost(String),
}

/// Drives the adapter link through its lifecycle
pub struct Supervisor {
    link: Arc<dyn AdapterLink>,
    config: MonitorConfig,
    state_tx: watch::Sender<LinkState>,
    failures_rx: mpsc::Receiver<PollFailure>,
    backoff: Backoff,
    verify_failures: u32,
    ever_connected: bool,
    vin_read: bool,
    health: Arc<HealthCounters>,
    device: Arc<RwLock<DeviceContext>>,
}

impl Supervisor {
    pub fn new(
        link: Arc<dyn AdapterLink>,
        config: MonitorConfig,
        health: Arc<HealthCounters>,
        device: Arc<RwLock<DeviceContext>>,
    ) -> (Self, QueryHandle, watch::Receiver<LinkState>) {
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let (failures_tx, failures_rx) = mpsc::channel(4);

        let handle = QueryHandle {
            link: link.clone(),
            command_timeout: config.command_timeout(),
            failures: failures_tx,
        };
        let supervisor = Self {
            link,
            backoff: Backoff::new(config.initial_backoff(), config.max_backoff()),
            config,
            state_tx,
            failures_rx,
            verify_failures: 0,
            ever_connected: false,
            vin_read: false,
            health,
            device,
        };
        (supervisor, handle, state_rx)
    }

    pub fn state(&self) -> LinkState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    /// Run the state machine until shutdown is requested
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(endpoint = %self.link.endpoint(), "Connection supervisor started");

        while !*shutdown.borrow() {
            match self.state() {
                LinkState::Disconnected => self.set_state(LinkState::Connecting),
                LinkState::Connecting => {
                    if !self.connect(&mut shutdown).await {
                        break;
                    }
                }
                LinkState::LinkUp => match self.verify().await {
                    Verified::Ready => self.enter_ready().await,
                    Verified::Failed(reason) => {
                        self.verify_failures = 1;
                        warn!(%reason, "Vehicle link not verified");
                        self.set_state(LinkState::Degraded);
                    }
                    Verified::SessionLost(reason) => {
                        if !self.escalate(&reason, &mut shutdown).await {
                            break;
                        }
                    }
                },
                LinkState::VehicleReady => {
                    tokio::select! {
                        failure = self.failures_rx.recv() => {
                            if let Some(failure) = failure {
                                warn!(%failure, "Poll failed, re-verifying vehicle link");
                                self.verify_failures = 0;
                                self.set_state(LinkState::Degraded);
                            }
                        }
                        _ = shutdown_requested(&mut shutdown) => break,
                    }
                }
                LinkState::Degraded => {
                    if self.verify_failures >= self.config.verify_retry_limit {
                        let reason = format!(
                            "{} consecutive verification failures",
                            self.verify_failures
                        );
                        if !self.escalate(&reason, &mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                    if !self.pause(self.config.verify_interval(), &mut shutdown).await {
                        break;
                    }
                    match self.verify().await {
                        Verified::Ready => self.enter_ready().await,
                        Verified::Failed(reason) => {
                            self.verify_failures += 1;
                            debug!(
                                attempt = self.verify_failures,
                                limit = self.config.verify_retry_limit,
                                %reason,
                                "Verification failed while degraded"
                            );
                        }
                        Verified::SessionLost(reason) => {
                            if !self.escalate(&reason, &mut shutdown).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!(state = %self.state(), "Connection supervisor stopping");
    }

    /// Disconnect cleanly and publish `Disconnected`
    pub async fn shutdown(&mut self) {
        self.link.disconnect().await;
        self.set_state(LinkState::Disconnected);
        info!(endpoint = %self.link.endpoint(), "Adapter released");
    }

    /// One connect attempt; returns false if shutdown interrupted the backoff
    async fn connect(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        match self.link.connect(self.config.connect_timeout()).await {
            Ok(()) => {
                if self.ever_connected {
                    self.health.record_reconnect();
                }
                self.ever_connected = true;
                self.set_state(LinkState::LinkUp);
                true
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                self.health.set_backoff_attempt(self.backoff.attempt());
                warn!(
                    error = %e,
                    attempt = self.backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Adapter connect failed"
                );
                self.set_state(LinkState::Disconnected);
                self.pause(delay, shutdown).await
            }
        }
    }

    async fn verify(&mut self) -> Verified {
        match self
            .link
            .send_query(QueryKind::VerifyVehicleLink, self.config.command_timeout())
            .await
        {
            Ok(QueryResponse::VehicleLink { protocol }) => {
                debug!(protocol = ?protocol, "Vehicle link verified");
                Verified::Ready
            }
            Ok(QueryResponse::NoVehicleLink(reason)) => Verified::Failed(reason),
            Ok(other) => Verified::Failed(format!("unexpected response {:?}", other)),
            Err(e) if e.is_session_lost() => Verified::SessionLost(e.to_string()),
            Err(e) => Verified::Failed(e.to_string()),
        }
    }

    async fn enter_ready(&mut self) {
        if !self.vin_read {
            self.read_vin().await;
        }

        // Reports from before this cycle are stale
        while self.failures_rx.try_recv().is_ok() {}

        self.backoff.reset();
        self.health.set_backoff_attempt(0);
        self.verify_failures = 0;
        self.set_state(LinkState::VehicleReady);
    }

    /// Best-effort VIN read, once per process
    async fn read_vin(&mut self) {
        match self
            .link
            .send_query(QueryKind::ReadVin, self.config.command_timeout())
            .await
        {
            Ok(QueryResponse::Vin(Some(vin))) => {
                info!(%vin, "Vehicle identified");
                self.device.write().vehicle_id = Some(vin);
                self.vin_read = true;
            }
            Ok(QueryResponse::Vin(None)) => {
                debug!("Vehicle does not report a VIN");
                self.vin_read = true;
            }
            Ok(other) => debug!(response = ?other, "VIN not available"),
            Err(e) => debug!(%e, "VIN read failed"),
        }
    }

    /// Tear the session down and start a full reconnect cycle
    async fn escalate(&mut self, reason: &str, shutdown: &mut watch::Receiver<bool>) -> bool {
        warn!(%reason, "Giving up on session, reconnecting");
        self.link.disconnect().await;
        self.verify_failures = 0;

        let delay = self.backoff.next_delay();
        self.health.set_backoff_attempt(self.backoff.attempt());
        self.set_state(LinkState::Disconnected);
        self.pause(delay, shutdown).await
    }

    /// Sleep unless shutdown arrives first; returns false on shutdown
    async fn pause(&self, delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown_requested(shutdown) => false,
        }
    }

    fn set_state(&self, next: LinkState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "Link state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use carbuddy_obd::{MockAdapterLink, MockConfig};

    use super::*;

    fn config() -> MonitorConfig {
        MonitorConfig {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 8_000,
            verify_retry_limit: 3,
            verify_interval_secs: 2,
            ..Default::default()
        }
    }

    fn mock(name: &str) -> Arc<MockAdapterLink> {
        Arc::new(MockAdapterLink::new(&MockConfig {
            name: name.to_string(),
            vin: Some("1D4GP00R55B123456".to_string()),
            ..Default::default()
        }))
    }

    fn supervisor(
        link: Arc<MockAdapterLink>,
        config: MonitorConfig,
    ) -> (
        Supervisor,
        QueryHandle,
        watch::Receiver<LinkState>,
        Arc<HealthCounters>,
        Arc<RwLock<DeviceContext>>,
    ) {
        let health = Arc::new(HealthCounters::default());
        let device = Arc::new(RwLock::new(DeviceContext::default()));
        let (supervisor, handle, state_rx) =
            Supervisor::new(link, config, health.clone(), device.clone());
        (supervisor, handle, state_rx, health, device)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_vehicle_ready_and_reads_vin() {
        let link = mock("sup-ready");
        let (mut supervisor, _handle, mut state_rx, _health, device) =
            supervisor(link.clone(), config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            supervisor.run(shutdown_rx).await;
            supervisor.shutdown().await;
            supervisor
        });

        state_rx
            .wait_for(|s| *s == LinkState::VehicleReady)
            .await
            .unwrap();
        assert_eq!(
            device.read().vehicle_id.as_deref(),
            Some("1D4GP00R55B123456")
        );

        shutdown_tx.send(true).unwrap();
        let supervisor = task.await.unwrap();
        assert_eq!(supervisor.state(), LinkState::Disconnected);
        assert!(!link.is_busy());
        assert_eq!(link.query_count(QueryKind::ReadVin), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_back_off_exponentially() {
        let link = mock("sup-backoff");
        link.fail_next_connects(4);
        let (mut supervisor, _handle, mut state_rx, health, _) =
            supervisor(link.clone(), config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        let task = tokio::spawn(async move {
            supervisor.run(shutdown_rx).await;
            supervisor.shutdown().await;
        });

        state_rx
            .wait_for(|s| *s == LinkState::VehicleReady)
            .await
            .unwrap();

        // Waits of 1s, 2s, 4s, 8s before the fifth attempt succeeds
        assert_eq!(started.elapsed(), Duration::from_secs(15));
        assert_eq!(link.connect_count(), 5);
        assert_eq!(health.snapshot(LinkState::VehicleReady, 0).backoff_attempt, 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unverified_link_escalates_without_polling() {
        let link = mock("sup-degraded");
        link.set_ignition(false);
        // Every link call yields, so the recorder sees each state
        link.set_latency(Duration::from_millis(10));
        let (mut supervisor, _handle, state_rx, _, _) = supervisor(link.clone(), config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut observed = state_rx.clone();
        let recorder = tokio::spawn(async move {
            let mut states = vec![*observed.borrow_and_update()];
            while observed.changed().await.is_ok() {
                let state = *observed.borrow_and_update();
                states.push(state);
                if state == LinkState::Disconnected && states.contains(&LinkState::Degraded) {
                    break;
                }
            }
            states
        });

        let task = tokio::spawn(async move {
            supervisor.run(shutdown_rx).await;
            supervisor.shutdown().await;
        });

        let states = recorder.await.unwrap();
        assert_eq!(
            states,
            vec![
                LinkState::Disconnected,
                LinkState::Connecting,
                LinkState::LinkUp,
                LinkState::Degraded,
                LinkState::Disconnected,
            ]
        );
        assert_eq!(link.query_count(QueryKind::VerifyVehicleLink), 3);
        assert_eq!(link.query_count(QueryKind::QueryTroubleCodes), 0);
        assert_eq!(link.disconnect_count(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_degrades_then_recovers() {
        let link = mock("sup-recover");
        let (mut supervisor, handle, mut state_rx, _, _) = supervisor(link.clone(), config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            supervisor.run(shutdown_rx).await;
            supervisor.shutdown().await;
        });

        state_rx
            .wait_for(|s| *s == LinkState::VehicleReady)
            .await
            .unwrap();
        handle.report_failure(PollFailure::NoVehicle("NO DATA".to_string()));

        state_rx
            .wait_for(|s| *s == LinkState::Degraded)
            .await
            .unwrap();
        state_rx
            .wait_for(|s| *s == LinkState::VehicleReady)
            .await
            .unwrap();

        // Recovered on the same session
        assert_eq!(link.connect_count(), 1);
        assert_eq!(link.query_count(QueryKind::VerifyVehicleLink), 2);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(!link.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_session_reconnects() {
        let link = mock("sup-closed");
        let (mut supervisor, handle, mut state_rx, health, _) =
            supervisor(link.clone(), config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            supervisor.run(shutdown_rx).await;
            supervisor.shutdown().await;
        });

        state_rx
            .wait_for(|s| *s == LinkState::VehicleReady)
            .await
            .unwrap();

        link.hang_up_next_queries(1);
        let result = handle.query_trouble_codes().await;
        assert_eq!(result, Err(LinkError::Closed));
        handle.report_failure(PollFailure::Link(LinkError::Closed));

        state_rx
            .wait_for(|s| *s == LinkState::Disconnected)
            .await
            .unwrap();
        state_rx
            .wait_for(|s| *s == LinkState::VehicleReady)
            .await
            .unwrap();

        assert_eq!(link.connect_count(), 2);
        assert_eq!(health.reconnects(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_device_escalates_without_degrading() {
        let link = mock("sup-broken");
        link.break_next_queries(1);
        let (mut supervisor, _handle, state_rx, health, _) = supervisor(link.clone(), config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut observed = state_rx.clone();
        let recorder = tokio::spawn(async move {
            let mut states = vec![*observed.borrow_and_update()];
            while observed.changed().await.is_ok() {
                let state = *observed.borrow_and_update();
                states.push(state);
                if state == LinkState::VehicleReady {
                    break;
                }
            }
            states
        });

        let started = tokio::time::Instant::now();
        let task = tokio::spawn(async move {
            supervisor.run(shutdown_rx).await;
            supervisor.shutdown().await;
        });

        let states = recorder.await.unwrap();
        assert!(!states.contains(&LinkState::Degraded));
        // One backoff step, no verify_interval pauses
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(link.connect_count(), 2);
        assert_eq!(health.reconnects(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
