//! Diagnostic link abstraction
//!
//! The sampling engine talks to the vehicle only through this trait, so a
//! real ELM327 adapter and an in-process fake are interchangeable.

use crate::error::ObdError;

/// An open connection to a vehicle diagnostic interface
#[allow(async_fn_in_trait)]
pub trait DiagnosticLink {
    /// Whether the vehicle reports support for a Mode 01 PID
    async fn query_capability(&mut self, pid: u8) -> Result<bool, ObdError>;

    /// Read the data bytes of a Mode 01 PID.
    ///
    /// `expected_bytes` of 0 means the caller does not know the width.
    async fn read_parameter(&mut self, pid: u8, expected_bytes: usize)
        -> Result<Vec<u8>, ObdError>;

    /// Release the connection
    async fn close(&mut self);
}
