//! ELM327 adapter link
//!
//! Speaks the ELM327 text protocol over any [`Connector`] stream: commands
//! are ASCII terminated by `\r`, every reply ends with a `>` prompt. A command
//! that times out leaves the adapter mid-reply, so the next command first
//! resynchronizes by sending `ATI` and discarding everything up to the
//! version banner.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::bluetooth::BluetoothDevice;
use super::lease::EndpointLease;
use super::stream::{AdapterStream, Connector};
use super::{AdapterLink, QueryKind, QueryResponse};
use crate::error::LinkError;
use crate::obd::{self, at, request, ElmReply};

/// Upper bound for the best-effort protocol close on disconnect
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// ELM327 adapter behind a serial, RFCOMM or TCP stream
pub struct Elm327Link {
    connector: Box<dyn Connector>,
    bluetooth: Option<BluetoothDevice>,
    session: Mutex<Option<Session>>,
}

impl Elm327Link {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            bluetooth: None,
            session: Mutex::new(None),
        }
    }

    /// Bring the Bluetooth link up before every connect
    pub fn with_bluetooth(mut self, device: BluetoothDevice) -> Self {
        self.bluetooth = Some(device);
        self
    }

    async fn open_session(&self, lease: EndpointLease) -> Result<Session, LinkError> {
        if let Some(device) = &self.bluetooth {
            device.ensure_connected().await?;
        }

        let stream = self
            .connector
            .open()
            .await
            .map_err(|e| LinkError::from_io(e, "open adapter"))?;
        let mut session = Session::new(stream, lease);

        for command in at::INIT_SEQUENCE {
            let raw = session.exchange(command).await?;
            match obd::parse_reply(&raw, command) {
                ElmReply::Rejected(reply) => {
                    return Err(LinkError::Protocol(format!(
                        "{} rejected: {}",
                        command, reply
                    )));
                }
                ElmReply::Data(lines) if *command == at::RESET => {
                    let banner = lines.join(" ");
                    if !banner.contains("ELM") {
                        return Err(LinkError::Protocol(format!(
                            "not an ELM327 adapter: {:?}",
                            banner
                        )));
                    }
                    debug!(%banner, "Adapter reset");
                }
                _ => {}
            }
        }

        Ok(session)
    }
}

#[async_trait]
impl AdapterLink for Elm327Link {
    fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    async fn connect(&self, timeout: Duration) -> Result<(), LinkError> {
        let endpoint = self.endpoint();
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Err(LinkError::Busy(format!(
                "{} already has an open session",
                endpoint
            )));
        }

        let lease = EndpointLease::acquire(&endpoint)?;
        info!(%endpoint, "Connecting to adapter");

        // Dropping the future on timeout drops the half-open session and its lease
        let session = tokio::time::timeout(timeout, self.open_session(lease))
            .await
            .map_err(|_| LinkError::Timeout(format!("connect to {}", endpoint)))??;

        *guard = Some(session);
        info!(%endpoint, "Adapter initialized");
        Ok(())
    }

    async fn send_query(
        &self,
        kind: QueryKind,
        timeout: Duration,
    ) -> Result<QueryResponse, LinkError> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Err(LinkError::Closed);
        };

        let result = match kind {
            QueryKind::VerifyVehicleLink => session.verify(timeout).await,
            QueryKind::QueryTroubleCodes => session.stored_codes(timeout).await,
            QueryKind::ClearTroubleCodes => session.clear_codes(timeout).await,
            QueryKind::ReadVin => session.read_vin(timeout).await,
        };

        if let Err(e) = &result {
            if e.is_session_lost() {
                warn!(endpoint = %self.endpoint(), %e, "Adapter session lost");
                *guard = None;
            }
        }
        result
    }

    async fn disconnect(&self) {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            let _ = session.command(at::PROTOCOL_CLOSE, CLOSE_TIMEOUT).await;
            let _ = session.stream.shutdown().await;
            info!(endpoint = %self.endpoint(), "Adapter session closed");
        }
    }
}

/// Decoded answer to an OBD request
enum ObdAnswer {
    Messages(Vec<Vec<u8>>),
    NoVehicle(String),
}

/// One open adapter session
struct Session {
    stream: Box<dyn AdapterStream>,
    buffer: Vec<u8>,
    needs_resync: bool,
    protocol: Option<String>,
    _lease: EndpointLease,
}

impl Session {
    fn new(stream: Box<dyn AdapterStream>, lease: EndpointLease) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(256),
            needs_resync: false,
            protocol: None,
            _lease: lease,
        }
    }

    async fn verify(&mut self, timeout: Duration) -> Result<QueryResponse, LinkError> {
        let deadline = Instant::now() + timeout;

        let messages = match self.obd_request(request::SUPPORTED_PIDS, timeout).await? {
            ObdAnswer::Messages(messages) => messages,
            ObdAnswer::NoVehicle(reason) => return Ok(QueryResponse::NoVehicleLink(reason)),
        };
        if !obd::is_link_ready(&messages) {
            return Err(LinkError::Protocol(format!(
                "unexpected reply to {}",
                request::SUPPORTED_PIDS
            )));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if self.protocol.is_none() && !remaining.is_zero() {
            match self.command(at::DESCRIBE_PROTOCOL_NUMBER, remaining).await {
                Ok(raw) => {
                    if let ElmReply::Data(lines) =
                        obd::parse_reply(&raw, at::DESCRIBE_PROTOCOL_NUMBER)
                    {
                        self.protocol = lines.first().and_then(|l| obd::protocol_description(l));
                    }
                    debug!(protocol = ?self.protocol, "Vehicle protocol detected");
                }
                Err(LinkError::Closed) => return Err(LinkError::Closed),
                Err(e) => debug!(%e, "Protocol query failed"),
            }
        }

        Ok(QueryResponse::VehicleLink {
            protocol: self.protocol.clone(),
        })
    }

    async fn stored_codes(&mut self, timeout: Duration) -> Result<QueryResponse, LinkError> {
        let deadline = Instant::now() + timeout;

        let reason = match self.obd_request(request::STORED_CODES, timeout).await? {
            ObdAnswer::Messages(messages) => {
                return obd::decode_stored_codes(&messages)
                    .map(QueryResponse::TroubleCodes)
                    .map_err(LinkError::Protocol);
            }
            ObdAnswer::NoVehicle(reason) => reason,
        };

        // Some ECUs (mostly K-line) answer mode 03 with NO DATA when nothing
        // is stored; only a failed 0100 means the vehicle is gone
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !obd::is_no_data(&reason) || remaining.is_zero() {
            return Ok(QueryResponse::NoVehicleLink(reason));
        }

        match self.obd_request(request::SUPPORTED_PIDS, remaining).await? {
            ObdAnswer::Messages(messages) if obd::is_link_ready(&messages) => {
                debug!("ECU answered NO DATA to stored codes, treating as none stored");
                Ok(QueryResponse::TroubleCodes(Vec::new()))
            }
            _ => Ok(QueryResponse::NoVehicleLink(reason)),
        }
    }

    async fn clear_codes(&mut self, timeout: Duration) -> Result<QueryResponse, LinkError> {
        match self.obd_request(request::CLEAR_CODES, timeout).await? {
            ObdAnswer::Messages(messages) if obd::is_clear_ack(&messages) => {
                Ok(QueryResponse::Cleared)
            }
            ObdAnswer::Messages(_) => Err(LinkError::Protocol(
                "clear codes not acknowledged".to_string(),
            )),
            ObdAnswer::NoVehicle(reason) => Ok(QueryResponse::NoVehicleLink(reason)),
        }
    }

    async fn read_vin(&mut self, timeout: Duration) -> Result<QueryResponse, LinkError> {
        match self.obd_request(request::VIN, timeout).await? {
            ObdAnswer::Messages(messages) => Ok(QueryResponse::Vin(obd::decode_vin(&messages))),
            ObdAnswer::NoVehicle(reason) => Ok(QueryResponse::NoVehicleLink(reason)),
        }
    }

    async fn obd_request(
        &mut self,
        request: &str,
        timeout: Duration,
    ) -> Result<ObdAnswer, LinkError> {
        let raw = self.command(request, timeout).await?;
        match obd::parse_reply(&raw, request) {
            ElmReply::Data(lines) => obd::assemble_messages(&lines)
                .map(ObdAnswer::Messages)
                .map_err(LinkError::Protocol),
            ElmReply::NoVehicle(reason) => Ok(ObdAnswer::NoVehicle(reason)),
            ElmReply::Rejected(reply) => Err(LinkError::Protocol(format!(
                "{} rejected: {}",
                request, reply
            ))),
        }
    }

    /// Send one command and return its reply, bounded by `timeout`
    async fn command(&mut self, command: &str, timeout: Duration) -> Result<String, LinkError> {
        let deadline = Instant::now() + timeout;

        if self.needs_resync {
            tokio::time::timeout_at(deadline, self.resync())
                .await
                .map_err(|_| LinkError::Timeout("adapter resync".to_string()))??;
        }

        match tokio::time::timeout_at(deadline, self.exchange(command)).await {
            Ok(result) => result,
            Err(_) => {
                self.needs_resync = true;
                Err(LinkError::Timeout(format!("{} after {:?}", command, timeout)))
            }
        }
    }

    async fn exchange(&mut self, command: &str) -> Result<String, LinkError> {
        self.buffer.clear();
        self.write_line(command).await?;
        let reply = self.read_prompt().await?;
        debug!(command, reply = %reply.trim(), "Adapter exchange");
        Ok(reply)
    }

    /// Discard stale output until the adapter answers `ATI` with its banner
    async fn resync(&mut self) -> Result<(), LinkError> {
        debug!("Resynchronizing adapter");
        self.buffer.clear();
        self.write_line(at::IDENTIFY).await?;
        loop {
            let reply = self.read_prompt().await?;
            if reply.contains("ELM") {
                break;
            }
        }
        self.buffer.clear();
        self.needs_resync = false;
        Ok(())
    }

    async fn write_line(&mut self, command: &str) -> Result<(), LinkError> {
        self.stream
            .write_all(format!("{}\r", command).as_bytes())
            .await
            .map_err(|e| LinkError::from_io(e, "write"))?;
        self.stream
            .flush()
            .await
            .map_err(|e| LinkError::from_io(e, "flush"))
    }

    /// Read until the next `>` prompt; bytes after it stay buffered
    async fn read_prompt(&mut self) -> Result<String, LinkError> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'>') {
                let reply: Vec<u8> = self.buffer.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&reply[..pos]).into_owned());
            }

            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| LinkError::from_io(e, "read"))?;
            if n == 0 {
                return Err(LinkError::Closed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}
