//! Mock adapter link for testing and `--mock` runs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::lease::EndpointLease;
use super::{AdapterLink, QueryKind, QueryResponse};
use crate::config::MockConfig;
use crate::error::LinkError;

const MOCK_PROTOCOL: &str = "ISO 15765-4 CAN (11 bit ID, 500 kbaud)";

/// Scripted adapter link
///
/// Behaves like a real link with respect to sessions and leases, while the
/// simulated vehicle (ignition, codes, VIN) and injected failures are
/// controlled from the outside.
pub struct MockAdapterLink {
    endpoint: String,
    latency: RwLock<Duration>,
    session: Mutex<Option<EndpointLease>>,
    ignition_on: AtomicBool,
    codes: RwLock<Vec<String>>,
    vin: RwLock<Option<String>>,
    /// Endpoint held by someone else
    foreign_busy: AtomicBool,
    /// Upcoming connect attempts that fail with `Unavailable`
    connect_failures: AtomicU32,
    /// Upcoming queries that fail with `Timeout`
    query_failures: AtomicU32,
    /// Upcoming queries that fail with `Closed` and drop the session
    hang_ups: AtomicU32,
    /// Upcoming queries that fail with `Unavailable` and drop the session
    io_failures: AtomicU32,
    connects: AtomicU32,
    disconnects: AtomicU32,
    queries: Mutex<HashMap<QueryKind, u32>>,
}

impl MockAdapterLink {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            endpoint: format!("mock://{}", config.name),
            latency: RwLock::new(Duration::from_millis(config.latency_ms)),
            session: Mutex::new(None),
            ignition_on: AtomicBool::new(config.ignition_on),
            codes: RwLock::new(config.codes.clone()),
            vin: RwLock::new(config.vin.clone()),
            foreign_busy: AtomicBool::new(false),
            connect_failures: AtomicU32::new(0),
            query_failures: AtomicU32::new(0),
            hang_ups: AtomicU32::new(0),
            io_failures: AtomicU32::new(0),
            connects: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
            queries: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the codes the vehicle reports
    pub fn set_codes<I, S>(&self, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.codes.write() = codes.into_iter().map(Into::into).collect();
    }

    pub fn set_ignition(&self, on: bool) {
        self.ignition_on.store(on, Ordering::SeqCst);
    }

    pub fn set_vin(&self, vin: Option<String>) {
        *self.vin.write() = vin;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Simulate another process holding the endpoint
    pub fn set_foreign_busy(&self, busy: bool) {
        self.foreign_busy.store(busy, Ordering::SeqCst);
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_queries(&self, count: u32) {
        self.query_failures.store(count, Ordering::SeqCst);
    }

    pub fn hang_up_next_queries(&self, count: u32) {
        self.hang_ups.store(count, Ordering::SeqCst);
    }

    /// Simulate the device node failing mid-session (e.g. RFCOMM dropped)
    pub fn break_next_queries(&self, count: u32) {
        self.io_failures.store(count, Ordering::SeqCst);
    }

    /// Whether this link currently holds its endpoint
    pub fn is_busy(&self) -> bool {
        EndpointLease::is_held(&self.endpoint)
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn query_count(&self, kind: QueryKind) -> u32 {
        self.queries.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Sleep for the configured latency, failing if it exceeds `timeout`
    async fn simulate_latency(&self, timeout: Duration, what: &str) -> Result<(), LinkError> {
        let latency = *self.latency.read();
        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(LinkError::Timeout(format!("{} after {:?}", what, timeout)));
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AdapterLink for MockAdapterLink {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn connect(&self, timeout: Duration) -> Result<(), LinkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency(timeout, "connect").await?;

        if self.foreign_busy.load(Ordering::SeqCst) {
            return Err(LinkError::Busy(format!("{} held elsewhere", self.endpoint)));
        }
        if Self::take_one(&self.connect_failures) {
            return Err(LinkError::Unavailable(format!(
                "{} not reachable",
                self.endpoint
            )));
        }

        let mut session = self.session.lock();
        if session.is_some() {
            return Err(LinkError::Busy(format!(
                "{} already has an open session",
                self.endpoint
            )));
        }
        *session = Some(EndpointLease::acquire(&self.endpoint)?);
        tracing::debug!(endpoint = %self.endpoint, "Mock link: connected");
        Ok(())
    }

    async fn send_query(
        &self,
        kind: QueryKind,
        timeout: Duration,
    ) -> Result<QueryResponse, LinkError> {
        if self.session.lock().is_none() {
            return Err(LinkError::Closed);
        }
        *self.queries.lock().entry(kind).or_insert(0) += 1;

        self.simulate_latency(timeout, &kind.to_string()).await?;

        if Self::take_one(&self.hang_ups) {
            self.session.lock().take();
            return Err(LinkError::Closed);
        }
        if Self::take_one(&self.io_failures) {
            self.session.lock().take();
            return Err(LinkError::Unavailable(format!("{}: I/O error (injected)", kind)));
        }
        if Self::take_one(&self.query_failures) {
            return Err(LinkError::Timeout(format!("{} (injected)", kind)));
        }

        let ignition_on = self.ignition_on.load(Ordering::SeqCst);
        let response = match kind {
            _ if !ignition_on => {
                QueryResponse::NoVehicleLink("UNABLE TO CONNECT".to_string())
            }
            QueryKind::VerifyVehicleLink => QueryResponse::VehicleLink {
                protocol: Some(MOCK_PROTOCOL.to_string()),
            },
            QueryKind::QueryTroubleCodes => QueryResponse::TroubleCodes(self.codes.read().clone()),
            QueryKind::ClearTroubleCodes => {
                self.codes.write().clear();
                QueryResponse::Cleared
            }
            QueryKind::ReadVin => QueryResponse::Vin(self.vin.read().clone()),
        };

        tracing::debug!(%kind, ?response, "Mock link: query");
        Ok(response)
    }

    async fn disconnect(&self) {
        if self.session.lock().take().is_some() {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(endpoint = %self.endpoint, "Mock link: disconnected");
        }
    }
}
