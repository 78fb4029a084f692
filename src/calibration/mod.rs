//! Calibration lookup tables
//!
//! Each measurement context has one table mapping the mean pad RMS to a
//! distance in millimetres. Tables are validated once at load time and never
//! mutated afterwards.

mod tables;

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

pub use tables::{CABLE_PAD_TABLE, WIRE_PAD_TABLE};

/// Calibration table errors
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration table is empty")]
    Empty,

    #[error("calibration table increases at index {index}: {previous} -> {value}")]
    NotMonotonic { index: usize, previous: i32, value: i32 },

    #[error("invalid calibration entry {entry:?} at position {position}")]
    InvalidEntry { position: usize, entry: String },

    #[error("failed to read calibration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable, non-increasing magnitude → distance table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTable {
    values: Vec<i32>,
}

impl CalibrationTable {
    /// Build a table, rejecting empty or increasing sequences
    pub fn new(values: Vec<i32>) -> Result<Self, CalibrationError> {
        if values.is_empty() {
            return Err(CalibrationError::Empty);
        }

        for (index, pair) in values.windows(2).enumerate() {
            if pair[1] > pair[0] {
                return Err(CalibrationError::NotMonotonic {
                    index: index + 1,
                    previous: pair[0],
                    value: pair[1],
                });
            }
        }

        Ok(Self { values })
    }

    /// Factory table for a single wire
    pub fn wire() -> Self {
        Self {
            values: WIRE_PAD_TABLE.to_vec(),
        }
    }

    /// Factory table for a cable
    pub fn cable() -> Self {
        Self {
            values: CABLE_PAD_TABLE.to_vec(),
        }
    }

    /// Parse a table from CSV text.
    ///
    /// Accepts integers separated by commas and/or whitespace, with an
    /// optional trailing comma, which is how the tables are exported from the
    /// calibration bench.
    pub fn parse_csv(text: &str) -> Result<Self, CalibrationError> {
        let mut values = Vec::new();

        for (position, entry) in text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .enumerate()
        {
            let value = entry.parse::<i32>().map_err(|_| CalibrationError::InvalidEntry {
                position,
                entry: entry.to_string(),
            })?;
            values.push(value);
        }

        Self::new(values)
    }

    /// Load a table from a CSV file
    pub fn from_csv_file(path: &Path) -> Result<Self, CalibrationError> {
        let text = fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::parse_csv(&text)?;
        info!(
            "Loaded calibration table from {} ({} entries)",
            path.display(),
            table.len()
        );
        Ok(table)
    }

    /// First index whose value is at or below `magnitude`.
    ///
    /// Returns `None` when the scan runs off the end of the table.
    pub fn lookup(&self, magnitude: i32) -> Option<usize> {
        let found = self.values.iter().position(|&v| v <= magnitude);
        if found.is_none() {
            debug!(
                "Calibration scan exhausted {} entries for magnitude {}",
                self.values.len(),
                magnitude
            );
        }
        found
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }
}

/// The pair of pad tables used by the estimator
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    pub wire: CalibrationTable,
    pub cable: CalibrationTable,
    /// Reproduce the legacy firmware, which scanned the wire table for cable
    /// distances as well
    pub legacy_cable_lookup: bool,
}

impl CalibrationSet {
    pub fn new(wire: CalibrationTable, cable: CalibrationTable) -> Self {
        Self {
            wire,
            cable,
            legacy_cable_lookup: false,
        }
    }

    pub fn with_legacy_cable_lookup(mut self, enabled: bool) -> Self {
        self.legacy_cable_lookup = enabled;
        self
    }

    /// Table used for cable distance lookups
    pub fn cable_lookup_table(&self) -> &CalibrationTable {
        if self.legacy_cable_lookup {
            &self.wire
        } else {
            &self.cable
        }
    }
}

impl Default for CalibrationSet {
    fn default() -> Self {
        Self::new(CalibrationTable::wire(), CalibrationTable::cable())
    }
}
