//! Batches of rows sharing one header

use crate::error::BatchError;
use crate::row::Row;
use crate::session::DriveSession;
use serde::{Deserialize, Serialize};

/// Borrowed view with the exact field layout of an encoded batch
#[derive(Serialize)]
struct BodyView<'a> {
    id: &'a DriveSession,
    h: &'a [String],
    d: &'a [Row],
}

/// An open batch. Rows can only be appended; sealing hands it off.
#[derive(Debug, Clone)]
pub struct Batch {
    session: DriveSession,
    header: Vec<String>,
    rows: Vec<Row>,
    /// Length of the encoded body with the current rows
    encoded_len: usize,
}

impl Batch {
    /// Open an empty batch for a session and header
    pub fn open(session: DriveSession, header: Vec<String>) -> Result<Self, BatchError> {
        let empty_len = serde_json::to_vec(&BodyView {
            id: &session,
            h: &header,
            d: &[],
        })?
        .len();

        Ok(Self {
            session,
            header,
            rows: Vec::new(),
            encoded_len: empty_len,
        })
    }

    /// Append a row of the header's width
    pub fn append(&mut self, row: Row) -> Result<(), BatchError> {
        if row.len() != self.header.len() {
            return Err(BatchError::ArityMismatch {
                expected: self.header.len(),
                actual: row.len(),
            });
        }

        let row_len = serde_json::to_vec(&row)?.len();
        let separator = usize::from(!self.rows.is_empty());
        self.encoded_len += row_len + separator;
        self.rows.push(row);
        Ok(())
    }

    /// Size in bytes the body would have if encoded now
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    pub fn session(&self) -> DriveSession {
        self.session
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Make the batch immutable for dispatch
    pub fn seal(self) -> SealedBatch {
        SealedBatch {
            session: self.session,
            header: self.header,
            rows: self.rows,
        }
    }
}

/// A batch handed to the dispatcher; its body is `{"id", "h", "d"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedBatch {
    #[serde(rename = "id")]
    session: DriveSession,
    #[serde(rename = "h")]
    header: Vec<String>,
    #[serde(rename = "d")]
    rows: Vec<Row>,
}

impl SealedBatch {
    pub fn session(&self) -> DriveSession {
        self.session
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Encode the message body
    pub fn encode(&self) -> Result<Vec<u8>, BatchError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a message body
    pub fn decode(body: &[u8]) -> Result<Self, BatchError> {
        Ok(serde_json::from_slice(body)?)
    }
}
