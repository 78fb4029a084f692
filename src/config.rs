//! Configuration loaded from environment variables

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::acquisition::{
    CaptureConfig, CaptureVariant, ChannelLayout, FrameWait, SyntheticSource, Waveform,
    DEFAULT_CHANNEL_COUNT, DEFAULT_RESOLUTION_BITS, DEFAULT_SAMPLES_PER_CHANNEL,
};
use crate::calibration::{CalibrationSet, CalibrationTable};
use crate::estimator::MeasurementMode;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Channels per frame (pad1, pad2, coil1, coil2)
    pub channel_count: usize,

    /// Samples per channel in one frame
    pub samples_per_channel: usize,

    /// Converter resolution in bits
    pub resolution_bits: u8,

    /// Timer trigger rate in Hz (0 = free running)
    pub trigger_rate_hz: u32,

    /// Scan or dual capture
    pub capture_variant: CaptureVariant,

    /// Conductor kind being traced
    pub measurement_mode: MeasurementMode,

    /// Frame wait timeout in milliseconds (0 = block)
    pub frame_timeout_ms: u64,

    /// Stop after this many frames (0 = run until Ctrl+C)
    pub max_frames: u64,

    /// Session summary interval in seconds
    pub stats_report_interval_secs: u64,

    /// Optional wire table override
    pub calibration_wire_csv: Option<PathBuf>,

    /// Optional cable table override
    pub calibration_cable_csv: Option<PathBuf>,

    /// Scan the wire table for cable distances, as older firmware did
    pub legacy_cable_lookup: bool,

    /// Synthetic pad RMS in codes
    pub synth_pad_amplitude: u32,

    /// Synthetic coil RMS in codes
    pub synth_coil_amplitude: u32,

    /// pad1 minus pad2 amplitude
    pub synth_pad_skew: i32,

    pub synth_waveform: Waveform,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            channel_count: env_parse("CHANNEL_COUNT", DEFAULT_CHANNEL_COUNT),

            samples_per_channel: env_parse("SAMPLES_PER_CHANNEL", DEFAULT_SAMPLES_PER_CHANNEL),

            resolution_bits: env_parse("RESOLUTION_BITS", DEFAULT_RESOLUTION_BITS),

            trigger_rate_hz: env_parse("TRIGGER_RATE_HZ", 600),  // 12 samples per 50 Hz period

            capture_variant: match std::env::var("CAPTURE_VARIANT") {
                Ok(v) if v.trim().eq_ignore_ascii_case("dual") => CaptureVariant::Dual,
                _ => CaptureVariant::Scan,
            },

            measurement_mode: std::env::var("MEASUREMENT_MODE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),

            frame_timeout_ms: env_parse("FRAME_TIMEOUT_MS", 0),

            max_frames: env_parse("MAX_FRAMES", 0),

            stats_report_interval_secs: env_parse("STATS_REPORT_INTERVAL_SECS", 10),

            calibration_wire_csv: std::env::var("CALIBRATION_WIRE_CSV").ok().map(PathBuf::from),

            calibration_cable_csv: std::env::var("CALIBRATION_CABLE_CSV").ok().map(PathBuf::from),

            legacy_cable_lookup: env_bool("CALIBRATION_LEGACY_CABLE_LOOKUP"),

            synth_pad_amplitude: env_parse("SYNTH_PAD_AMPLITUDE", 600),

            synth_coil_amplitude: env_parse("SYNTH_COIL_AMPLITUDE", 500),

            synth_pad_skew: env_parse("SYNTH_PAD_SKEW", 0),

            synth_waveform: match std::env::var("SYNTH_WAVEFORM") {
                Ok(v) if v.trim().eq_ignore_ascii_case("ramp") => Waveform::Ramp,
                _ => Waveform::Sine,
            },
        }
    }

    /// Validated frame geometry
    pub fn layout(&self) -> Result<ChannelLayout> {
        let layout = ChannelLayout::new(
            self.channel_count,
            self.samples_per_channel,
            self.resolution_bits,
        )
        .context("Invalid frame layout")?;
        layout
            .check_variant(self.capture_variant)
            .context("Layout not supported by capture variant")?;
        Ok(layout)
    }

    pub fn frame_wait(&self) -> FrameWait {
        FrameWait::from_millis(self.frame_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.stats_report_interval_secs.max(1))
    }

    pub fn capture_config(&self) -> Result<CaptureConfig> {
        Ok(CaptureConfig {
            layout: self.layout()?,
            variant: self.capture_variant,
            trigger_rate_hz: self.trigger_rate_hz,
            frame_wait: self.frame_wait(),
            max_frames: self.max_frames,
        })
    }

    /// Factory tables, replaced by CSV files where configured
    pub fn calibration(&self) -> Result<CalibrationSet> {
        let wire = match &self.calibration_wire_csv {
            Some(path) => CalibrationTable::from_csv_file(path)
                .with_context(|| format!("Failed to load wire table {}", path.display()))?,
            None => CalibrationTable::wire(),
        };
        let cable = match &self.calibration_cable_csv {
            Some(path) => CalibrationTable::from_csv_file(path)
                .with_context(|| format!("Failed to load cable table {}", path.display()))?,
            None => CalibrationTable::cable(),
        };

        if self.legacy_cable_lookup {
            info!("Legacy cable lookup enabled: cable distances use the wire table");
        }

        Ok(CalibrationSet::new(wire, cable).with_legacy_cable_lookup(self.legacy_cable_lookup))
    }

    /// Synthetic front end matching the configured channel count
    pub fn synthetic_source(&self) -> SyntheticSource {
        match self.synth_waveform {
            Waveform::Ramp => SyntheticSource::ramp(),
            Waveform::Sine if self.channel_count == DEFAULT_CHANNEL_COUNT => {
                SyntheticSource::pads_and_coils(
                    self.synth_pad_amplitude,
                    self.synth_coil_amplitude,
                    self.synth_pad_skew,
                )
            }
            Waveform::Sine => SyntheticSource::sine(vec![self.synth_pad_amplitude; self.channel_count]),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_count: DEFAULT_CHANNEL_COUNT,
            samples_per_channel: DEFAULT_SAMPLES_PER_CHANNEL,
            resolution_bits: DEFAULT_RESOLUTION_BITS,
            trigger_rate_hz: 600,
            capture_variant: CaptureVariant::Scan,
            measurement_mode: MeasurementMode::Wire,
            frame_timeout_ms: 0,
            max_frames: 0,
            stats_report_interval_secs: 10,
            calibration_wire_csv: None,
            calibration_cable_csv: None,
            legacy_cable_lookup: false,
            synth_pad_amplitude: 600,
            synth_coil_amplitude: 500,
            synth_pad_skew: 0,
            synth_waveform: Waveform::Sine,
        }
    }
}
