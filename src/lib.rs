//! Cable locator - timer-triggered capture and field-based estimation
//!
//! Captures interleaved pad and coil samples, splits them per channel and
//! turns their RMS values into distance, bearing and current estimates.

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod demux;
pub mod estimator;
pub mod session;
pub mod stats;

pub use acquisition::{CaptureController, ChannelLayout, FrameReceiver, SampleSource};
pub use calibration::{CalibrationSet, CalibrationTable};
pub use config::Config;
pub use demux::{Channel, ChannelSet};
pub use estimator::{
    Bearing, Direction, Estimator, Measurement, MeasurementMode, Reading, SamplingPrecision,
};
pub use session::{LogPresenter, MeasurementSession, Presenter};
