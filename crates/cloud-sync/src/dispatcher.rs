//! Synchronous message dispatch
//!
//! Each send is enqueue followed by a blocking flush. Failures are logged
//! and counted; the message is dropped and the caller carries on.

use crate::message::{build_start_message, build_telemetry_message, Message};
use crate::transport::Transport;
use crate::CloudError;
use std::time::Duration;
use telemetry::{DriveSession, SealedBatch};
use tracing::{error, info};

pub struct Dispatcher<T> {
    transport: T,
    address: String,
    sent: u64,
    failed: u64,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            sent: 0,
            failed: 0,
        }
    }

    /// Announce a new drive session
    pub async fn send_start(&mut self, session: DriveSession) -> Result<(), CloudError> {
        match build_start_message(&self.address, session) {
            Ok(message) => self.send(message).await,
            Err(e) => Err(self.report("start message", e)),
        }
    }

    /// Send one sealed batch as a telemetry message
    pub async fn send_batch(&mut self, batch: &SealedBatch) -> Result<(), CloudError> {
        match build_telemetry_message(&self.address, batch) {
            Ok(message) => self.send(message).await,
            Err(e) => Err(self.report("telemetry message", e)),
        }
    }

    pub async fn send(&mut self, message: Message) -> Result<(), CloudError> {
        let topic = message.topic();
        let rows = message.rows();

        if let Err(e) = self.transport.enqueue(&topic, message.into_body()).await {
            return Err(self.report(&topic, e));
        }
        if let Err(e) = self.transport.send_pending().await {
            return Err(self.report(&topic, e));
        }

        self.sent += 1;
        metrics::counter!("obd_logger_messages_sent").increment(1);
        if rows > 0 {
            metrics::counter!("obd_logger_rows").increment(rows as u64);
            info!("message {} sent with {} rows", self.sent, rows);
        }
        Ok(())
    }

    fn report(&mut self, what: &str, e: CloudError) -> CloudError {
        self.failed += 1;
        metrics::counter!("obd_logger_dispatch_errors").increment(1);
        error!("Dispatch of {} failed: {}", what, e);
        e
    }

    /// Messages the broker accepted
    pub fn messages_sent(&self) -> u64 {
        self.sent
    }

    /// Messages dropped after an error
    pub fn messages_failed(&self) -> u64 {
        self.failed
    }

    /// Pause between sends without letting the broker connection go stale
    pub async fn idle(&mut self, wait: Duration) {
        self.transport.idle(wait).await;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Release the broker connection
    pub async fn close(mut self) -> T {
        self.transport.close().await;
        self.transport
    }
}
