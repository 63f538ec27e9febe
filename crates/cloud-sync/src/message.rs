//! Broker messages

use crate::CloudError;
use serde::Serialize;
use telemetry::{DriveSession, SealedBatch};

/// Subject of the start-of-session control message
pub const SUBJECT_TRIP: &str = "trip";

/// Subject of telemetry batches
pub const SUBJECT_TELEMETRY: &str = "tele";

/// An addressed, encoded message ready to enqueue
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    address: String,
    subject: &'static str,
    body: Vec<u8>,
    rows: usize,
}

impl Message {
    /// Topic the message is published on: `<address>/<subject>`
    pub fn topic(&self) -> String {
        format!("{}/{}", self.address, self.subject)
    }

    pub fn subject(&self) -> &'static str {
        self.subject
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Telemetry rows carried; zero for control messages
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn into_body(self) -> Vec<u8> {
        self.body
    }
}

#[derive(Serialize)]
struct StartBody {
    id: DriveSession,
}

/// Control message marking the start of a drive session
pub fn build_start_message(address: &str, session: DriveSession) -> Result<Message, CloudError> {
    Ok(Message {
        address: address.to_string(),
        subject: SUBJECT_TRIP,
        body: serde_json::to_vec(&StartBody { id: session })?,
        rows: 0,
    })
}

/// Telemetry message carrying one sealed batch
pub fn build_telemetry_message(address: &str, batch: &SealedBatch) -> Result<Message, CloudError> {
    Ok(Message {
        address: address.to_string(),
        subject: SUBJECT_TELEMETRY,
        body: batch.encode()?,
        rows: batch.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry::{build_header, Batch, Reading, RowAssembler};

    #[test]
    fn test_start_message() {
        let session = DriveSession::new();
        let message = build_start_message("vehicles/42", session).unwrap();
        assert_eq!(message.topic(), "vehicles/42/trip");
        assert_eq!(message.rows(), 0);

        let body: serde_json::Value = serde_json::from_slice(message.body()).unwrap();
        assert_eq!(body, serde_json::json!({ "id": session.to_string() }));
    }

    #[test]
    fn test_telemetry_message_body() {
        let header = build_header(["rpm"]);
        let assembler = RowAssembler::new(1);
        let mut batch = Batch::open(DriveSession::new(), header).unwrap();
        batch
            .append(assembler.assemble(5.0, &[Reading::Value(900.0)], None).unwrap())
            .unwrap();
        let sealed = batch.seal();

        let message = build_telemetry_message("fleet", &sealed).unwrap();
        assert_eq!(message.topic(), "fleet/tele");
        assert_eq!(message.rows(), 1);
        assert_eq!(SealedBatch::decode(message.body()).unwrap(), sealed);
    }
}
