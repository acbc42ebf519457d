//! End-to-end: ELM327 over TCP, full monitor pipeline, Sentry over HTTP
//!
//! A fake WiFi ELM327 and a fake Sentry store endpoint both run on ephemeral
//! localhost ports. Runs on the real clock.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use carbuddy_core::LinkState;
use carbuddy_monitor::{DispatchConfig, Monitor};
use carbuddy_obd::{create_link, TcpConfig, TransportConfig};
use carbuddy_sentry::{SentryConfig, SentrySink};
use carbuddy_tests::{device, monitor_config, wait_until, RunningMonitor};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Shared state of the simulated adapter and vehicle
#[derive(Default)]
struct FakeAdapter {
    /// Reply to mode 03, without the trailing prompt
    stored_codes: Mutex<String>,
    commands: Mutex<Vec<String>>,
}

impl FakeAdapter {
    fn reply(&self, command: &str) -> String {
        self.commands.lock().push(command.to_string());
        match command {
            "ATZ" => "\r\rELM327 v1.5\r\r".to_string(),
            "ATI" => "ELM327 v1.5\r\r".to_string(),
            "ATDPN" => "A6\r\r".to_string(),
            c if c.starts_with("AT") => "OK\r\r".to_string(),
            "0100" => "41 00 BE 3F A8 13\r\r".to_string(),
            "03" => format!("{}\r\r", self.stored_codes.lock()),
            "04" => "44\r\r".to_string(),
            "0902" => "014\r0: 49 02 01 31 48 47\r1: 43 4D 38 32 36 33 33\r2: 41 30 30 34 33 35 32\r\r"
                .to_string(),
            _ => "?\r\r".to_string(),
        }
    }

    fn saw(&self, command: &str) -> bool {
        self.commands.lock().iter().any(|c| c == command)
    }
}

async fn serve_adapter(mut stream: TcpStream, adapter: Arc<FakeAdapter>) {
    let mut line = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        for &byte in &buf[..n] {
            if byte != b'\r' {
                line.push(byte);
                continue;
            }
            let command = String::from_utf8_lossy(&line).trim().to_uppercase();
            line.clear();
            let reply = format!("{}>", adapter.reply(&command));
            if stream.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

async fn start_adapter(adapter: Arc<FakeAdapter>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_adapter(stream, adapter.clone()));
        }
    });
    port
}

#[derive(Clone, Default)]
struct FakeSentry {
    events: Arc<Mutex<Vec<Value>>>,
}

async fn store(State(fake): State<FakeSentry>, Json(body): Json<Value>) -> StatusCode {
    fake.events.lock().push(body);
    StatusCode::OK
}

async fn start_sentry(fake: FakeSentry) -> String {
    let router = Router::new()
        .route("/api/{project}/store/", post(store))
        .with_state(fake);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://testkey@{}/7", addr)
}

#[tokio::test]
async fn test_codes_flow_from_adapter_to_sentry() {
    let adapter = Arc::new(FakeAdapter::default());
    // P0301 and P0420 with the CAN count byte
    *adapter.stored_codes.lock() = "43 02 03 01 04 20".to_string();
    let port = start_adapter(adapter.clone()).await;

    let sentry = FakeSentry::default();
    let dsn = start_sentry(sentry.clone()).await;

    let link = create_link(&TransportConfig::Tcp(TcpConfig {
        host: "127.0.0.1".to_string(),
        port,
    }))
    .unwrap();
    let sink = Arc::new(SentrySink::new(&SentryConfig::new(dsn)).unwrap());
    let monitor = Monitor::new(
        link,
        sink,
        monitor_config(1),
        DispatchConfig::default(),
        device(),
    )
    .unwrap();
    let running = RunningMonitor::start(monitor);

    let events = sentry.events.clone();
    assert!(wait_until(Duration::from_secs(10), || events.lock().len() == 2).await);
    assert_eq!(running.handle.link_state(), LinkState::VehicleReady);

    {
        let events = events.lock();
        let codes: Vec<&str> = events
            .iter()
            .map(|e| e["tags"]["dtc_code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["P0301", "P0420"]);
        assert_eq!(events[0]["level"], "error");
        assert_eq!(events[0]["tags"]["vehicle_id"], "1HGCM82633A004352");
        assert_eq!(events[0]["user"]["id"], "cb-itest");
    }

    // P0301 repaired
    *adapter.stored_codes.lock() = "43 01 04 20".to_string();
    assert!(wait_until(Duration::from_secs(10), || events.lock().len() == 3).await);
    {
        let events = events.lock();
        assert_eq!(events[2]["tags"]["dtc_code"], "P0301");
        assert_eq!(events[2]["level"], "info");
        assert!(events[2]["message"].as_str().unwrap().contains("cleared"));
    }

    running.stop().await;

    for command in ["ATZ", "ATE0", "0100", "ATDPN", "0902", "03", "ATPC"] {
        assert!(adapter.saw(command), "adapter never saw {}", command);
    }
    assert!(!adapter.saw("04"));
}

#[tokio::test]
async fn test_repair_on_no_data_ecu_reports_resolved() {
    let adapter = Arc::new(FakeAdapter::default());
    *adapter.stored_codes.lock() = "43 01 03 01".to_string();
    let port = start_adapter(adapter.clone()).await;

    let sentry = FakeSentry::default();
    let dsn = start_sentry(sentry.clone()).await;

    let link = create_link(&TransportConfig::Tcp(TcpConfig {
        host: "127.0.0.1".to_string(),
        port,
    }))
    .unwrap();
    let sink = Arc::new(SentrySink::new(&SentryConfig::new(dsn)).unwrap());
    let monitor = Monitor::new(
        link,
        sink,
        monitor_config(1),
        DispatchConfig::default(),
        device(),
    )
    .unwrap();
    let running = RunningMonitor::start(monitor);
    let handle = running.handle.clone();

    let events = sentry.events.clone();
    assert!(wait_until(Duration::from_secs(10), || events.lock().len() == 1).await);

    // Older ECUs answer mode 03 with NO DATA once nothing is stored
    *adapter.stored_codes.lock() = "NO DATA".to_string();
    assert!(wait_until(Duration::from_secs(10), || events.lock().len() == 2).await);
    {
        let events = events.lock();
        assert_eq!(events[1]["tags"]["dtc_code"], "P0301");
        assert_eq!(events[1]["tags"]["dtc_event"], "resolved");
        assert_eq!(events[1]["level"], "info");
    }

    // Polls keep succeeding and the link stays ready
    let polled = handle.snapshot().last_poll_at;
    assert!(wait_until(Duration::from_secs(5), || handle.snapshot().last_poll_at > polled).await);
    assert_eq!(handle.link_state(), LinkState::VehicleReady);
    assert!(handle.active_codes().is_empty());
    assert_eq!(handle.snapshot().reconnects, 0);
    assert_eq!(events.lock().len(), 2);

    running.stop().await;
}

#[tokio::test]
async fn test_unreachable_adapter_keeps_retrying() {
    // Grab a free port, then close it so connects are refused
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let sentry = FakeSentry::default();
    let dsn = start_sentry(sentry.clone()).await;

    let link = create_link(&TransportConfig::Tcp(TcpConfig {
        host: "127.0.0.1".to_string(),
        port,
    }))
    .unwrap();
    let sink = Arc::new(SentrySink::new(&SentryConfig::new(dsn)).unwrap());
    let mut config = monitor_config(1);
    config.initial_backoff_ms = 100;
    config.max_backoff_ms = 200;
    let monitor = Monitor::new(link, sink, config, DispatchConfig::default(), device()).unwrap();
    let running = RunningMonitor::start(monitor);

    let handle = running.handle.clone();
    assert!(wait_until(Duration::from_secs(5), || handle.snapshot().backoff_attempt >= 3).await);
    assert_ne!(handle.link_state(), LinkState::VehicleReady);

    running.stop().await;
    assert!(sentry.events.lock().is_empty());
}
