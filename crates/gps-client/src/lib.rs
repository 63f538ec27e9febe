//! gpsd Client
//!
//! Connects to a local gpsd over TCP, enables JSON watch mode and keeps
//! the most recent position report available for non-blocking polling.

mod client;
mod error;
mod fix;

pub use client::{GpsdClient, DEFAULT_GPSD_HOST, DEFAULT_GPSD_PORT};
pub use error::GpsError;
pub use fix::{Fix, FixQuality, ALTITUDE_UNKNOWN};
