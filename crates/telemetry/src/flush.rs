//! Flush policy
//!
//! Each trigger sees every appended row. The batch is flushed as soon as
//! any trigger fires; all triggers still observe the row so their own
//! state stays current.

use crate::batch::Batch;
use crate::reading::Reading;
use crate::row::Row;
use std::fmt;

/// Why a batch was flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Encoded body grew past the payload threshold
    Size,
    /// Engine speed dropped from positive to zero
    EngineStopped,
    /// Sampling is ending
    Shutdown,
    /// A new drive session was requested
    TripBoundary,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FlushReason::Size => "size",
            FlushReason::EngineStopped => "engine stopped",
            FlushReason::Shutdown => "shutdown",
            FlushReason::TripBoundary => "trip boundary",
        };
        f.write_str(reason)
    }
}

/// A rule deciding that the open batch should be sent now
pub trait FlushTrigger: fmt::Debug {
    /// Observe the row just appended to `batch`
    fn observe(&mut self, batch: &Batch, row: &Row) -> Option<FlushReason>;
}

/// Fires once the encoded body strictly exceeds `max_bytes`
#[derive(Debug, Clone)]
pub struct SizeTrigger {
    max_bytes: usize,
}

impl SizeTrigger {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl FlushTrigger for SizeTrigger {
    fn observe(&mut self, batch: &Batch, _row: &Row) -> Option<FlushReason> {
        (batch.encoded_len() > self.max_bytes).then_some(FlushReason::Size)
    }
}

/// The last two engine speeds seen.
///
/// An unavailable reading leaves the last known speed in place.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RpmTrend {
    previous: f64,
    current: f64,
}

impl RpmTrend {
    pub fn observe(&mut self, reading: Reading) {
        self.previous = self.current;
        if let Some(rpm) = reading.value() {
            self.current = rpm;
        }
    }

    /// True only on the tick where speed went from positive to exactly zero
    pub fn just_stopped(&self) -> bool {
        self.previous > 0.0 && self.current == 0.0
    }
}

/// Fires when the engine speed column drops to zero
#[derive(Debug, Clone)]
pub struct EngineStopTrigger {
    column: usize,
    trend: RpmTrend,
}

impl EngineStopTrigger {
    /// Trigger watching `column_name`; `None` when the header lacks it
    pub fn for_header(header: &[String], column_name: &str) -> Option<Self> {
        let column = header.iter().position(|c| c == column_name)?;
        Some(Self {
            column,
            trend: RpmTrend::default(),
        })
    }
}

impl FlushTrigger for EngineStopTrigger {
    fn observe(&mut self, _batch: &Batch, row: &Row) -> Option<FlushReason> {
        self.trend
            .observe(row.get(self.column).unwrap_or(Reading::Unavailable));
        self.trend.just_stopped().then_some(FlushReason::EngineStopped)
    }
}

/// The set of triggers consulted after every append
#[derive(Debug, Default)]
pub struct FlushPolicy {
    triggers: Vec<Box<dyn FlushTrigger>>,
}

impl FlushPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trigger(mut self, trigger: impl FlushTrigger + 'static) -> Self {
        self.triggers.push(Box::new(trigger));
        self
    }

    /// Size threshold plus, when enabled and present, the engine-stop heuristic
    pub fn standard(
        header: &[String],
        max_bytes: usize,
        engine_stop_column: Option<&str>,
    ) -> Self {
        let policy = Self::new().with_trigger(SizeTrigger::new(max_bytes));
        match engine_stop_column.and_then(|c| EngineStopTrigger::for_header(header, c)) {
            Some(trigger) => policy.with_trigger(trigger),
            None => policy,
        }
    }

    /// Feed the appended row to every trigger; the first reason wins
    pub fn should_flush(&mut self, batch: &Batch, row: &Row) -> Option<FlushReason> {
        self.triggers
            .iter_mut()
            .fold(None, |due, trigger| {
                let fired = trigger.observe(batch, row);
                due.or(fired)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{build_header, RowAssembler};
    use crate::session::DriveSession;

    fn rpm_row(assembler: &RowAssembler, t: f64, rpm: Option<f64>) -> Row {
        assembler.assemble(t, &[rpm.into()], None).unwrap()
    }

    #[test]
    fn test_size_trigger_is_strict() {
        let header = build_header(["rpm"]);
        let assembler = RowAssembler::new(1);
        let mut batch = Batch::open(DriveSession::new(), header).unwrap();
        let row = rpm_row(&assembler, 1.0, Some(800.0));
        batch.append(row.clone()).unwrap();
        let size = batch.encoded_len();

        // Exactly at the threshold: not over it
        let mut at = SizeTrigger::new(size);
        assert_eq!(at.observe(&batch, &row), None);

        // One byte under the body size: over it
        let mut under = SizeTrigger::new(size - 1);
        assert_eq!(under.observe(&batch, &row), Some(FlushReason::Size));
    }

    #[test]
    fn test_rpm_trend_edges() {
        let mut trend = RpmTrend::default();
        let mut fired = Vec::new();
        for rpm in [Some(0.0), Some(750.0), None, Some(0.0), Some(0.0), None, Some(0.0)] {
            trend.observe(rpm.into());
            fired.push(trend.just_stopped());
        }
        assert_eq!(fired, vec![false, false, false, true, false, false, false]);
    }

    #[test]
    fn test_engine_stop_fires_once_per_stop() {
        let header = build_header(["temp", "rpm"]);
        let assembler = RowAssembler::new(2);
        let mut policy = FlushPolicy::standard(&header, usize::MAX, Some("rpm"));
        let mut batch = Batch::open(DriveSession::new(), header).unwrap();

        let mut reasons = Vec::new();
        for (t, rpm) in [900.0, 850.0, 0.0, 0.0, 0.0, 1200.0, 0.0].iter().enumerate() {
            let row = assembler
                .assemble(t as f64, &[Reading::Value(90.0), Reading::Value(*rpm)], None)
                .unwrap();
            batch.append(row.clone()).unwrap();
            reasons.push(policy.should_flush(&batch, &row));
        }

        let stops: Vec<_> = reasons
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == Some(FlushReason::EngineStopped))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(stops, vec![2, 6]);
    }

    #[test]
    fn test_engine_stop_needs_column() {
        let header = build_header(["temp"]);
        assert!(EngineStopTrigger::for_header(&header, "rpm").is_none());

        let policy = FlushPolicy::standard(&header, 1024, Some("rpm"));
        assert_eq!(policy.triggers.len(), 1);
    }

    #[test]
    fn test_all_triggers_observe_every_row() {
        let header = build_header(["rpm"]);
        let assembler = RowAssembler::new(1);
        // Size fires on every row and is listed first
        let mut policy = FlushPolicy::standard(&header, 0, Some("rpm"));
        let mut batch = Batch::open(DriveSession::new(), header).unwrap();

        let running = rpm_row(&assembler, 0.0, Some(700.0));
        batch.append(running.clone()).unwrap();
        assert_eq!(policy.should_flush(&batch, &running), Some(FlushReason::Size));

        // Had the engine trigger been skipped above, it would not have seen
        // 700 rpm and the following zero would fire nothing
        let mut engine_only = FlushPolicy::new()
            .with_trigger(EngineStopTrigger::for_header(batch.header(), "rpm").unwrap());
        engine_only.should_flush(&batch, &running);

        let stopped = rpm_row(&assembler, 1.0, Some(0.0));
        batch.append(stopped.clone()).unwrap();
        assert_eq!(policy.should_flush(&batch, &stopped), Some(FlushReason::Size));
        assert_eq!(
            engine_only.should_flush(&batch, &stopped),
            Some(FlushReason::EngineStopped)
        );

        // The policy's own engine trigger saw both rows despite the size flush
        let idle = rpm_row(&assembler, 2.0, Some(0.0));
        assert_eq!(policy.triggers[1].observe(&batch, &idle), None);
    }

    #[test]
    fn test_first_reason_wins_and_trend_advances() {
        let header = build_header(["rpm"]);
        let assembler = RowAssembler::new(1);
        let mut policy = FlushPolicy::new()
            .with_trigger(EngineStopTrigger::for_header(&header, "rpm").unwrap())
            .with_trigger(SizeTrigger::new(0));
        let mut batch = Batch::open(DriveSession::new(), header).unwrap();

        for (t, rpm) in [(0.0, 500.0), (1.0, 0.0)] {
            let row = rpm_row(&assembler, t, Some(rpm));
            batch.append(row.clone()).unwrap();
            let reason = policy.should_flush(&batch, &row);
            let expected = if rpm == 0.0 {
                FlushReason::EngineStopped
            } else {
                FlushReason::Size
            };
            assert_eq!(reason, Some(expected));
        }
    }
}
