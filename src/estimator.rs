//! Physical quantity estimation
//!
//! Distance, bearing and current are derived from per-channel RMS values:
//!
//! - distance: mean pad RMS scanned against the calibration table of the
//!   measurement mode
//! - bearing: pad RMS difference scaled onto +/-45 degrees
//! - current: mean coil RMS classified into the 1.2 A / 5 A bands
//!
//! Distance and current are [`Reading`]s and the bearing is optional;
//! inconclusive inputs give [`Reading::OutOfRange`] or no bearing rather
//! than an error.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::calibration::CalibrationSet;
use crate::demux::{Channel, ChannelSet};
use crate::stats::{self, StatsError};

/// Wire mode: at or above this the sensor head touches the conductor
const WIRE_CONTACT_LEVEL: i32 = 900;
/// Wire mode: at or below this the field is lost in noise
const WIRE_NOISE_LEVEL: i32 = 96;
const CABLE_CONTACT_LEVEL: i32 = 500;
const CABLE_NOISE_LEVEL: i32 = 72;

/// Pad difference clamp, asymmetric to match pad gains
const ANGLE_DIFF_MIN: i32 = -222;
const ANGLE_DIFF_MAX: i32 = 232;
/// Differences above this read as "conductor to the left"
const LEFT_THRESHOLD: i32 = 20;
const MAX_ANGLE_DEG: i32 = 45;

/// Current bands in milliamps
const CURRENT_LOW_MA: i32 = 1200;
const CURRENT_HIGH_MA: i32 = 5000;

/// Legacy "no value" marker
pub const OUT_OF_RANGE_SENTINEL: i32 = -1;

/// Which conductor kind is being traced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementMode {
    #[default]
    Wire,
    Cable,
}

impl MeasurementMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementMode::Wire => "wire",
            MeasurementMode::Cable => "cable",
        }
    }
}

impl FromStr for MeasurementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wire" | "a" => Ok(MeasurementMode::Wire),
            "cable" | "b" => Ok(MeasurementMode::Cable),
            other => Err(format!("unknown measurement mode '{}'", other)),
        }
    }
}

/// How many of the most recent samples each statistic uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingPrecision {
    Quick,
    Accurate,
}

impl SamplingPrecision {
    pub fn window_len(self) -> usize {
        match self {
            SamplingPrecision::Quick => 10,
            SamplingPrecision::Accurate => 50,
        }
    }
}

/// Side of the sensor head the conductor is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    /// Reserved for display; never produced by [`bearing_from_diff`]
    Center,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Center => "center",
        }
    }
}

/// A single estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Value(i32),
    OutOfRange,
}

impl Reading {
    pub fn value(self) -> Option<i32> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::OutOfRange => None,
        }
    }

    pub fn is_out_of_range(self) -> bool {
        self == Reading::OutOfRange
    }

    /// Integer form with `-1` for out of range
    pub fn to_legacy(self) -> i32 {
        self.value().unwrap_or(OUT_OF_RANGE_SENTINEL)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => write!(f, "{}", v),
            Reading::OutOfRange => f.write_str("OUT OF RANGE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bearing {
    /// Degrees, -45..=45
    pub angle: i32,
    pub direction: Direction,
}

/// All estimates for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub mode: MeasurementMode,
    /// Millimetres
    pub distance_quick: Reading,
    pub distance_accurate: Reading,
    /// Milliamps
    pub current_quick: Reading,
    pub current_accurate: Reading,
    /// `None` when a pad window is empty
    pub bearing: Option<Bearing>,
}

impl Measurement {
    /// Either distance reading is out of range
    pub fn is_out_of_range(&self) -> bool {
        self.distance_quick.is_out_of_range() || self.distance_accurate.is_out_of_range()
    }
}

/// Map a mean pad magnitude to a distance
pub fn distance_from_magnitude(
    magnitude: i32,
    mode: MeasurementMode,
    calibration: &CalibrationSet,
) -> Reading {
    let (contact, noise, table) = match mode {
        MeasurementMode::Wire => (WIRE_CONTACT_LEVEL, WIRE_NOISE_LEVEL, &calibration.wire),
        MeasurementMode::Cable => (
            CABLE_CONTACT_LEVEL,
            CABLE_NOISE_LEVEL,
            calibration.cable_lookup_table(),
        ),
    };

    if magnitude >= contact {
        return Reading::Value(0);
    }
    if magnitude <= noise {
        return Reading::OutOfRange;
    }

    match table.lookup(magnitude) {
        Some(mm) => Reading::Value(mm as i32),
        None => Reading::OutOfRange,
    }
}

/// Scale a pad RMS difference onto an angle and side
pub fn bearing_from_diff(diff: i32) -> Bearing {
    let diff = diff.clamp(ANGLE_DIFF_MIN, ANGLE_DIFF_MAX);
    if diff > LEFT_THRESHOLD {
        Bearing {
            angle: MAX_ANGLE_DEG * diff / ANGLE_DIFF_MAX,
            direction: Direction::Left,
        }
    } else {
        Bearing {
            angle: MAX_ANGLE_DEG * diff / -ANGLE_DIFF_MIN,
            direction: Direction::Right,
        }
    }
}

/// Classify a mean coil magnitude into a current band
pub fn current_from_magnitude(magnitude: i32, mode: MeasurementMode) -> Reading {
    match mode {
        MeasurementMode::Wire => match magnitude {
            401..=850 => Reading::Value(CURRENT_LOW_MA),
            m if m > 850 => Reading::Value(CURRENT_HIGH_MA),
            _ => Reading::OutOfRange,
        },
        // Bands overlap on 401..=420; the low band is checked first
        MeasurementMode::Cable => match magnitude {
            250..=420 => Reading::Value(CURRENT_LOW_MA),
            m if m > 400 => Reading::Value(CURRENT_HIGH_MA),
            _ => Reading::OutOfRange,
        },
    }
}

/// Estimator bound to one set of calibration tables
#[derive(Debug, Clone, Default)]
pub struct Estimator {
    calibration: CalibrationSet,
}

impl Estimator {
    pub fn new(calibration: CalibrationSet) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> &CalibrationSet {
        &self.calibration
    }

    pub fn distance(
        &self,
        channels: &ChannelSet,
        mode: MeasurementMode,
        precision: SamplingPrecision,
    ) -> Reading {
        match pair_magnitude(channels, Channel::Pad1, Channel::Pad2, precision) {
            Ok(e) => {
                let reading = distance_from_magnitude(e, mode, &self.calibration);
                trace!("Distance: e={} mode={} -> {}", e, mode.as_str(), reading);
                reading
            }
            Err(err) => {
                debug!("Distance unavailable: {}", err);
                Reading::OutOfRange
            }
        }
    }

    /// Bearing from the accurate pad window; `None` (out of range) when
    /// either pad has no samples
    pub fn angle(&self, channels: &ChannelSet) -> Option<Bearing> {
        let n = SamplingPrecision::Accurate.window_len();
        let pad1 = stats::rms(stats::window(channels.get(Channel::Pad1), n));
        let pad2 = stats::rms(stats::window(channels.get(Channel::Pad2), n));

        match (pad1, pad2) {
            (Ok(a), Ok(b)) => Some(bearing_from_diff(a - b)),
            (Err(err), _) | (_, Err(err)) => {
                debug!("Angle unavailable: {}", err);
                None
            }
        }
    }

    pub fn current(
        &self,
        channels: &ChannelSet,
        mode: MeasurementMode,
        precision: SamplingPrecision,
    ) -> Reading {
        match pair_magnitude(channels, Channel::Coil1, Channel::Coil2, precision) {
            Ok(b) => current_from_magnitude(b, mode),
            Err(err) => {
                debug!("Current unavailable: {}", err);
                Reading::OutOfRange
            }
        }
    }

    /// Evaluate every estimate for one demultiplexed frame
    pub fn measure(&self, channels: &ChannelSet, mode: MeasurementMode, sequence: u64) -> Measurement {
        Measurement {
            sequence,
            timestamp: Utc::now(),
            mode,
            distance_quick: self.distance(channels, mode, SamplingPrecision::Quick),
            distance_accurate: self.distance(channels, mode, SamplingPrecision::Accurate),
            current_quick: self.current(channels, mode, SamplingPrecision::Quick),
            current_accurate: self.current(channels, mode, SamplingPrecision::Accurate),
            bearing: self.angle(channels),
        }
    }
}

/// Mean RMS of two channels over the precision window
fn pair_magnitude(
    channels: &ChannelSet,
    a: Channel,
    b: Channel,
    precision: SamplingPrecision,
) -> Result<i32, StatsError> {
    let n = precision.window_len();
    let rms_a = stats::rms(stats::window(channels.get(a), n))?;
    let rms_b = stats::rms(stats::window(channels.get(b), n))?;
    Ok((rms_a + rms_b) / 2)
}
