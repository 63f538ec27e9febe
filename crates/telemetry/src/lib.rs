//! Telemetry Batching
//!
//! Turns per-tick readings into fixed-arity rows, buffers them into
//! batches under a drive session and decides when a batch is flushed.

mod accumulator;
mod batch;
mod error;
mod flush;
mod reading;
mod row;
mod session;

pub use accumulator::BatchAccumulator;
pub use batch::{Batch, SealedBatch};
pub use error::BatchError;
pub use flush::{EngineStopTrigger, FlushPolicy, FlushReason, FlushTrigger, RpmTrend, SizeTrigger};
pub use reading::Reading;
pub use row::{build_header, PositionReadings, Row, RowAssembler, POSITION_COLUMNS, TIME_COLUMN};
pub use session::DriveSession;

/// Default size threshold for a batch body (bytes)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024;
