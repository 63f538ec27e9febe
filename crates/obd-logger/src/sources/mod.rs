//! Source adapters

mod diagnostic;
mod position;

pub use diagnostic::{DiagnosticAdapter, DiagnosticReading};
pub use position::{GpsdConnector, PositionAdapter, PositionConnector, PositionLink};
