//! Cloud Synchronization Module
//!
//! Turns sealed telemetry batches into broker messages and sends them:
//! - Start-of-session and telemetry message construction
//! - MQTT transport with acknowledged publish
//! - Synchronous dispatch with error accounting

mod dispatcher;
mod message;
mod mqtt;
mod transport;

pub use dispatcher::Dispatcher;
pub use message::{build_start_message, build_telemetry_message, Message, SUBJECT_TELEMETRY, SUBJECT_TRIP};
pub use mqtt::MqttTransport;
pub use transport::Transport;

use std::time::Duration;
use thiserror::Error;

/// Cloud sync error types
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("No acknowledgement within {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CloudError {
    fn from(e: serde_json::Error) -> Self {
        CloudError::Serialization(e.to_string())
    }
}

impl From<telemetry::BatchError> for CloudError {
    fn from(e: telemetry::BatchError) -> Self {
        CloudError::Serialization(e.to_string())
    }
}

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// MQTT broker host
    pub broker_host: String,
    /// MQTT port
    pub broker_port: u16,
    /// Client identifier presented to the broker
    pub client_id: String,
    /// 0, 1 or 2; anything else falls back to 0
    pub qos: u8,
    pub keep_alive: Duration,
    /// Bound on waiting for the broker to take a publish
    pub send_timeout: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "obd-logger".to_string(),
            qos: 1,
            keep_alive: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
        }
    }
}
