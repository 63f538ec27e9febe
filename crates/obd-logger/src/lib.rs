//! OBD Logger
//!
//! Samples an OBD-II adapter and gpsd at a fixed rate, batches the rows
//! under a drive session and ships each batch to a message broker.

pub mod clock;
pub mod config;
pub mod engine;
pub mod signals;
pub mod sources;

use crate::clock::{Clock, SystemClock};
use crate::config::LoggerConfig;
use crate::engine::{Engine, RunSummary, StartupError};
use crate::signals::ControlFlags;
use crate::sources::{GpsdConnector, PositionAdapter};
use cloud_sync::MqttTransport;
use obd_protocol::{resolve, CapabilitySet, DiagnosticLink, ObdClient, ObdError};
use std::sync::Arc;
use std::time::Duration;
use telemetry::DriveSession;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Bound on each gpsd connection attempt
const GPSD_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Initialize logging to stderr at `level`
pub fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level: Level = level.parse()?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Open the OBD adapter, logging instead of failing when it is absent
pub async fn open_diagnostic(config: &LoggerConfig) -> Option<ObdClient> {
    match ObdClient::open(&config.serial_port, config.baud_rate, config.protocol()).await {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Couldn't open OBD adapter on {}: {}", config.serial_port, e);
            None
        }
    }
}

/// Resolve the columns the attached vehicle supports
pub async fn list_capabilities(config: &LoggerConfig) -> Result<CapabilitySet, ObdError> {
    let mut client =
        ObdClient::open(&config.serial_port, config.baud_rate, config.protocol()).await?;
    let capabilities = resolve(Some(&mut client), &config.wishlist()).await;
    client.close().await;
    Ok(capabilities)
}

/// Run the logger from STARTUP to SHUTDOWN
pub async fn launch(
    config: &LoggerConfig,
    flags: Arc<ControlFlags>,
) -> Result<RunSummary, StartupError> {
    let destination = config.destination().ok_or(StartupError::NoDestination)?;

    let clock = SystemClock;
    let diagnostic = open_diagnostic(config).await;
    let connector = GpsdConnector::new(config.gpsd_host.clone(), config.gpsd_port, GPSD_CONNECT_TIMEOUT);
    let position = PositionAdapter::open(connector, clock.now()?, config.gps_retry()).await;

    let session = DriveSession::new();
    let transport = MqttTransport::new(&config.cloud_config(session));
    let engine = Engine::startup(
        config.engine_settings(destination),
        session,
        diagnostic,
        position,
        transport,
        clock,
        flags.clone(),
    )
    .await?;

    let _signals = signals::install(flags).map_err(StartupError::Signals)?;
    info!("Sampling to {}", destination);
    Ok(engine.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;

    #[tokio::test]
    async fn test_launch_without_destination_fails_first() {
        let cli = Cli {
            serial_port: Some("/nonexistent/tty".to_string()),
            ..Cli::default()
        };
        let config = LoggerConfig::load(&cli).unwrap();
        let result = launch(&config, ControlFlags::new()).await;
        assert!(matches!(result, Err(StartupError::NoDestination)));
    }

    #[tokio::test]
    async fn test_capabilities_with_mock_adapter() {
        let cli = Cli {
            serial_port: Some(obd_protocol::MOCK_DEVICE.to_string()),
            log_columns: Some(String::new()),
            ..Cli::default()
        };
        let config = LoggerConfig::load(&cli).unwrap();
        let capabilities = list_capabilities(&config).await.unwrap();
        let columns: Vec<_> = capabilities.columns().collect();
        assert_eq!(columns, vec!["load_pct", "temp", "rpm", "vss", "maf", "throttlepos"]);
    }
}
