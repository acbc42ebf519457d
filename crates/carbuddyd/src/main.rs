//! carbuddyd - CarBuddy daemon
//!
//! Monitors an ELM327 OBD-II adapter for diagnostic trouble codes and reports
//! new and cleared codes to Sentry.
//!
//! Usage:
//!   carbuddyd [OPTIONS] [config.toml]
//!
//! Options:
//!   --mock         Use the simulated adapter and log events instead of sending them
//!   --clear-codes  Clear stored trouble codes once and exit
//!   --log-json     Emit JSON log lines
//!
//! If no config file is provided, runs against the simulated adapter.

mod clear;
mod config;
mod device;
mod preflight;
mod status;

use std::sync::Arc;

use anyhow::Context;
use carbuddy_core::EventSink;
use carbuddy_monitor::Monitor;
use carbuddy_obd::{create_link, MockConfig, TransportConfig};
use carbuddy_sentry::{LogSink, SentrySink};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::DaemonConfig;

const DEFAULT_LOG_FILTER: &str =
    "carbuddyd=info,carbuddy_monitor=info,carbuddy_obd=debug,carbuddy_sentry=info";

/// Parsed command-line arguments
#[derive(Debug, Default)]
struct Args {
    config_path: Option<String>,
    mock: bool,
    clear_codes: bool,
    log_json: bool,
}

fn parse_args() -> Args {
    let mut result = Args::default();

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--mock" => result.mock = true,
            "--clear-codes" => result.clear_codes = true,
            "--log-json" => result.log_json = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("carbuddyd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => result.config_path = Some(arg.to_string()),
            _ => eprintln!("Ignoring unknown argument: {}", arg),
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"carbuddyd - CarBuddy OBD-II trouble code monitor

Usage: carbuddyd [OPTIONS] [config.toml]

Options:
      --mock         Use the simulated adapter; events are logged, not sent
      --clear-codes  Connect, clear stored trouble codes and exit
      --log-json     Emit JSON log lines
  -h, --help         Print this help message
  -V, --version      Print version

Examples:
  # Run against the simulated adapter
  carbuddyd

  # Run with config file
  carbuddyd /etc/carbuddy/carbuddy.toml

  # Clear codes after a repair
  carbuddyd --clear-codes /etc/carbuddy/carbuddy.toml
"#
    );
}

fn init_logging(level: Option<&str>, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => EnvFilter::new(format!(
            "carbuddyd={0},carbuddy_monitor={0},carbuddy_obd={0},carbuddy_sentry={0}",
            level.to_lowercase()
        )),
        None => EnvFilter::new(DEFAULT_LOG_FILTER),
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Adapter used by `--mock` and when no config file is given
fn demo_transport() -> TransportConfig {
    TransportConfig::Mock(MockConfig {
        codes: vec!["P0171".to_string(), "P0420".to_string()],
        vin: Some("1HGCM82633A004352".to_string()),
        latency_ms: 50,
        ..Default::default()
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();

    let mut config = match &args.config_path {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig {
            transport: demo_transport(),
            ..Default::default()
        },
    };
    init_logging(config.log_level.as_deref(), args.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting carbuddyd");
    match &args.config_path {
        Some(path) => info!("Loaded config from {}", path),
        None => info!("No config file provided, using simulated adapter"),
    }
    if args.mock {
        warn!("Running in mock mode: simulated adapter, events are only logged");
        config.transport = demo_transport();
    }

    let link = create_link(&config.transport).with_context(|| {
        format!(
            "Failed to create adapter link for {}",
            config.transport.endpoint()
        )
    })?;

    if args.clear_codes {
        return clear::clear_codes(
            link.as_ref(),
            config.monitor.connect_timeout(),
            config.monitor.command_timeout(),
        )
        .await;
    }

    let sentry = match &config.sentry {
        Some(sentry) if !args.mock => {
            let sink = SentrySink::new(sentry).context("Failed to create Sentry sink")?;
            info!(dsn = %sink.dsn(), environment = %sentry.environment, "Reporting to Sentry");
            Some(Arc::new(sink))
        }
        _ => {
            info!("No Sentry DSN configured, events go to the log");
            None
        }
    };

    let device = device::detect(&config.device);
    info!(
        device_id = %device.device_id,
        device_type = device.device_type.as_deref().unwrap_or("unknown"),
        endpoint = %link.endpoint(),
        poll_interval_secs = config.monitor.poll_interval_secs,
        "Device detected"
    );

    preflight::check_bluetooth(&config.transport).await;
    let sink: Arc<dyn EventSink> = match sentry {
        Some(sentry) => {
            let startup_device = device.clone();
            let check = sentry.clone();
            tokio::spawn(async move {
                preflight::check_sentry(&check, &startup_device).await;
            });
            sentry
        }
        None => Arc::new(LogSink::new()),
    };

    let monitor = Monitor::new(
        link,
        sink,
        config.monitor.clone(),
        config.dispatch.clone(),
        device,
    )
    .context("Invalid monitor configuration")?;
    let handle = monitor.handle();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.status.enabled {
        let addr = config.status.bind_addr()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind status endpoint on {}", addr))?;
        tokio::spawn(status::serve(listener, handle.clone(), shutdown_rx.clone()));
    }

    if let Some(every) = config.status.health_log_interval() {
        tokio::spawn(status::log_health(handle.clone(), every, shutdown_rx.clone()));
    }

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    monitor.run(shutdown_rx).await;
    info!("carbuddyd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(%e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(%e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
