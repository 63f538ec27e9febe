//! OBD-II Protocol Implementation
//!
//! This crate provides async serial communication with ELM327-compatible
//! OBD-II adapters, the Mode 01 PID catalog and the startup capability
//! resolution that decides which columns get logged.

mod capabilities;
mod client;
mod error;
mod link;
mod pid;
mod protocol;

pub use capabilities::{parse_wishlist, resolve, Capability, CapabilitySet};
pub use client::{ObdClient, MOCK_DEVICE};
pub use error::ObdError;
pub use link::DiagnosticLink;
pub use pid::{lookup, lookup_column, Conversion, PidSpec, MODE1_CATALOG, RPM_COLUMN};
pub use protocol::{mode1_request, parse_mode1_response, ObdProtocol};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Response offset added to the request mode
    pub const RESPONSE_OFFSET: u8 = 0x40;
}
