//! HTTP status endpoint and periodic health log

use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use carbuddy_core::{DeviceContext, HealthSnapshot};
use carbuddy_monitor::{ActiveCodeSet, MonitorHandle};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" while the vehicle is being polled, otherwise "degraded"
    pub status: &'static str,
    #[serde(flatten)]
    pub health: HealthSnapshot,
    pub device: DeviceContext,
}

async fn health(State(handle): State<MonitorHandle>) -> Json<HealthResponse> {
    let health = handle.snapshot();
    Json(HealthResponse {
        status: if health.link_state.can_poll() { "ok" } else { "degraded" },
        health,
        device: handle.device(),
    })
}

async fn codes(State(handle): State<MonitorHandle>) -> Json<ActiveCodeSet> {
    Json(handle.active_codes().as_ref().clone())
}

pub fn create_router(handle: MonitorHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/codes", get(codes))
        .with_state(handle)
}

/// Serve the status endpoint until shutdown
pub async fn serve(
    listener: TcpListener,
    handle: MonitorHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Status endpoint listening on http://{}", addr);
    }
    let result = axum::serve(listener, create_router(handle))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await;
    if let Err(e) = result {
        warn!(%e, "Status endpoint stopped");
    }
}

/// Log a health line every `every` until shutdown
pub async fn log_health(
    handle: MonitorHandle,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let h = handle.snapshot();
                info!(
                    state = %h.link_state,
                    active_codes = h.active_codes,
                    last_poll_at = ?h.last_poll_at,
                    reconnects = h.reconnects,
                    backoff_attempt = h.backoff_attempt,
                    enqueued = h.events_enqueued,
                    delivered = h.events_delivered,
                    dropped = h.events_dropped,
                    queue_depth = h.queue_depth,
                    "Health"
                );
            }
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
}
