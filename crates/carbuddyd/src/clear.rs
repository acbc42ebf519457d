//! One-shot `--clear-codes` command

use std::time::Duration;

use anyhow::{bail, Context};
use carbuddy_obd::{AdapterLink, QueryKind, QueryResponse};
use tracing::info;

/// Connect, verify the vehicle answers, clear stored codes, disconnect
pub async fn clear_codes(
    link: &dyn AdapterLink,
    connect_timeout: Duration,
    command_timeout: Duration,
) -> anyhow::Result<()> {
    let endpoint = link.endpoint();
    link.connect(connect_timeout)
        .await
        .with_context(|| format!("Failed to connect to adapter {}", endpoint))?;

    let result = verify_and_clear(link, command_timeout).await;
    link.disconnect().await;
    result
}

async fn verify_and_clear(link: &dyn AdapterLink, timeout: Duration) -> anyhow::Result<()> {
    match link
        .send_query(QueryKind::VerifyVehicleLink, timeout)
        .await
        .context("Vehicle link verification failed")?
    {
        QueryResponse::VehicleLink { protocol } => {
            info!(protocol = protocol.as_deref().unwrap_or("unknown"), "Vehicle link verified")
        }
        QueryResponse::NoVehicleLink(reason) => {
            bail!("Vehicle is not responding ({}); is the ignition on?", reason)
        }
        other => bail!("Unexpected response to verification: {:?}", other),
    }

    match link
        .send_query(QueryKind::ClearTroubleCodes, timeout)
        .await
        .context("Clearing trouble codes failed")?
    {
        QueryResponse::Cleared => {
            info!("Stored trouble codes cleared");
            Ok(())
        }
        QueryResponse::NoVehicleLink(reason) => bail!("Vehicle refused to clear codes: {}", reason),
        other => bail!("Unexpected response to clear: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use carbuddy_obd::{MockAdapterLink, MockConfig};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn link(name: &str) -> MockAdapterLink {
        MockAdapterLink::new(&MockConfig {
            name: name.to_string(),
            codes: vec!["P0420".to_string()],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_clear_codes() {
        let link = link("clear-ok");
        clear_codes(&link, TIMEOUT, TIMEOUT).await.unwrap();

        assert_eq!(link.query_count(QueryKind::VerifyVehicleLink), 1);
        assert_eq!(link.query_count(QueryKind::ClearTroubleCodes), 1);
        assert_eq!(link.disconnect_count(), 1);
        assert!(!link.is_busy());
    }

    #[tokio::test]
    async fn test_clear_refused_with_ignition_off() {
        let link = link("clear-ignition-off");
        link.set_ignition(false);

        let err = clear_codes(&link, TIMEOUT, TIMEOUT).await.unwrap_err();
        assert!(err.to_string().contains("ignition"));
        assert_eq!(link.query_count(QueryKind::ClearTroubleCodes), 0);
        assert_eq!(link.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_reports_busy_adapter() {
        let link = link("clear-busy");
        link.set_foreign_busy(true);

        assert!(clear_codes(&link, TIMEOUT, TIMEOUT).await.is_err());
        assert_eq!(link.query_count(QueryKind::VerifyVehicleLink), 0);
    }
}
