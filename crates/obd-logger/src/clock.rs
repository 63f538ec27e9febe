use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("System clock is {0:?} before the unix epoch")]
pub struct ClockError(pub Duration);

/// Wall-clock source for capture timestamps
pub trait Clock {
    /// Seconds since the unix epoch
    fn now(&self) -> Result<f64, ClockError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<f64, ClockError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_secs_f64())
            .map_err(|e| ClockError(e.duration()))
    }
}
