//! gpsd Error Types

use thiserror::Error;

/// Errors talking to gpsd
#[derive(Debug, Error)]
pub enum GpsError {
    /// TCP connection could not be established
    #[error("Failed to connect to gpsd at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// Connection attempt took too long
    #[error("Timed out connecting to gpsd after {0}ms")]
    Timeout(u64),

    /// gpsd closed the stream
    #[error("gpsd closed the connection")]
    Disconnected,

    /// Socket error after connecting
    #[error("gpsd I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report could not be decoded
    #[error("Malformed gpsd report: {0}")]
    Parse(String),
}
