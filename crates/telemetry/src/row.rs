//! Row assembly
//!
//! A row is one tick: capture time, every active diagnostic column in
//! capability order, then the fixed position columns. Missing data is kept
//! as [`Reading::Unavailable`] so every row has the header's width.

use crate::error::BatchError;
use crate::reading::Reading;
use serde::{Deserialize, Serialize};

/// Header name of the capture timestamp column
pub const TIME_COLUMN: &str = "dtm";

/// Position columns, in row order
pub const POSITION_COLUMNS: [&str; 6] = ["lat", "lon", "alt", "crs", "spd", "gtm"];

/// Position values for one tick, ordered as [`POSITION_COLUMNS`]
pub type PositionReadings = [Reading; POSITION_COLUMNS.len()];

/// Full header for a set of diagnostic columns
pub fn build_header<'a, I>(diagnostic_columns: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut header = vec![TIME_COLUMN.to_string()];
    header.extend(diagnostic_columns.into_iter().map(str::to_string));
    header.extend(POSITION_COLUMNS.iter().map(|c| c.to_string()));
    header
}

/// One sample tick across all columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Vec<Reading>);

impl Row {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Reading] {
        &self.0
    }

    /// Capture time in seconds since the unix epoch
    pub fn timestamp(&self) -> Option<f64> {
        self.0.first().and_then(Reading::value)
    }

    pub fn get(&self, column: usize) -> Option<Reading> {
        self.0.get(column).copied()
    }
}

impl From<Vec<Reading>> for Row {
    fn from(values: Vec<Reading>) -> Self {
        Self(values)
    }
}

/// Composes rows of a fixed width
#[derive(Debug, Clone)]
pub struct RowAssembler {
    diagnostic_columns: usize,
}

impl RowAssembler {
    pub fn new(diagnostic_columns: usize) -> Self {
        Self { diagnostic_columns }
    }

    /// Width of every row produced
    pub fn width(&self) -> usize {
        1 + self.diagnostic_columns + POSITION_COLUMNS.len()
    }

    /// Compose a row; absent position data becomes a run of nulls
    pub fn assemble(
        &self,
        timestamp: f64,
        diagnostics: &[Reading],
        position: Option<&PositionReadings>,
    ) -> Result<Row, BatchError> {
        if diagnostics.len() != self.diagnostic_columns {
            return Err(BatchError::ArityMismatch {
                expected: self.width(),
                actual: 1 + diagnostics.len() + POSITION_COLUMNS.len(),
            });
        }

        let mut values = Vec::with_capacity(self.width());
        values.push(Reading::Value(timestamp));
        values.extend_from_slice(diagnostics);
        match position {
            Some(position) => values.extend_from_slice(position),
            None => values.extend([Reading::Unavailable; POSITION_COLUMNS.len()]),
        }
        Ok(Row(values))
    }
}
