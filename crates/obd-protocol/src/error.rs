//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Error)]
pub enum ObdError {
    /// Serial port connection error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Invalid response from adapter
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Adapter answered with NO DATA
    #[error("No data returned for PID {0:02X}")]
    NoData(u8),

    /// Adapter not responding
    #[error("OBD adapter not responding")]
    AdapterNotResponding,

    /// CAN bus error
    #[error("CAN bus error: {0}")]
    CanBusError(String),

    /// Serial stream closed underneath us
    #[error("OBD adapter disconnected")]
    Disconnected,
}

impl ObdError {
    /// Whether the error means the diagnostic link itself is broken.
    ///
    /// Non-fatal errors only blank the reading they occurred on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ObdError::SerialError(_)
                | ObdError::AdapterNotResponding
                | ObdError::CanBusError(_)
                | ObdError::Disconnected
        )
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}
