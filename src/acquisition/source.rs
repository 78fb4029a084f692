//! Hardware abstraction for the analog front end
//!
//! The sampler only needs three things from the converter hardware: arm it
//! with a layout and trigger rate, read one conversion round per trigger, and
//! stop it. Anything that can do that implements [`SampleSource`].

use std::f64::consts::PI;

use thiserror::Error;
use tracing::debug;

use super::layout::ChannelLayout;

/// Mains frequency the synthetic field oscillates at
const MAINS_HZ: f64 = 50.0;

/// Phase reference used when the trigger is free running
const NOMINAL_TRIGGER_HZ: u32 = 600;

/// DAC ramp increment per trigger
const RAMP_STEP: u32 = 20;

/// Converter errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("converter not started")]
    NotStarted,

    #[error("converter fault: {0}")]
    Hardware(String),
}

/// Analog front end driven by the sampler
pub trait SampleSource: Send {
    /// Arm the converters for `layout`, triggered at `trigger_rate_hz`
    fn start_capture(&mut self, layout: &ChannelLayout, trigger_rate_hz: u32)
        -> Result<(), SourceError>;

    /// Perform one conversion round: one code per channel, in channel order.
    ///
    /// `codes.len()` equals the layout's channel count.
    fn convert(&mut self, codes: &mut [u16]) -> Result<(), SourceError>;

    /// Disable triggering and conversion
    fn stop_capture(&mut self);
}

/// Shape of the synthetic signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    /// 50 Hz sine around mid-scale; amplitude is the target RMS per channel
    #[default]
    Sine,
    /// DAC sawtooth loopback: +20 codes per trigger, wrapping at full scale
    Ramp,
}

impl Waveform {
    pub fn as_str(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Ramp => "ramp",
        }
    }
}

/// Deterministic signal generator standing in for the pad and coil inputs
pub struct SyntheticSource {
    waveform: Waveform,
    /// Target RMS per channel (sine only)
    amplitudes: Vec<u32>,
    max_code: u32,
    trigger_rate_hz: u32,
    tick: u64,
    ramp: u32,
    running: bool,
}

impl SyntheticSource {
    /// Sine source with one RMS amplitude per channel
    pub fn sine(amplitudes: Vec<u32>) -> Self {
        Self {
            waveform: Waveform::Sine,
            amplitudes,
            max_code: 0,
            trigger_rate_hz: NOMINAL_TRIGGER_HZ,
            tick: 0,
            ramp: 0,
            running: false,
        }
    }

    /// Sawtooth source, identical on every channel
    pub fn ramp() -> Self {
        Self {
            waveform: Waveform::Ramp,
            ..Self::sine(Vec::new())
        }
    }

    /// Four-channel pad/coil source.
    ///
    /// `pad_skew` raises pad1 and lowers pad2 by half its value each, which
    /// shifts the computed angle.
    pub fn pads_and_coils(pad_rms: u32, coil_rms: u32, pad_skew: i32) -> Self {
        let half = pad_skew / 2;
        let pad1 = (pad_rms as i32 + half).max(0) as u32;
        let pad2 = (pad_rms as i32 - half).max(0) as u32;
        Self::sine(vec![pad1, pad2, coil_rms, coil_rms])
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    fn sine_code(&self, channel: usize) -> u32 {
        let mid = (self.max_code + 1) / 2;
        let rms = self.amplitudes.get(channel).copied().unwrap_or(0) as f64;
        let peak = rms * 2f64.sqrt();
        let t = self.tick as f64 / self.trigger_rate_hz as f64;
        let value = mid as f64 + peak * (2.0 * PI * MAINS_HZ * t).sin();
        value.round().clamp(0.0, self.max_code as f64) as u32
    }
}

impl SampleSource for SyntheticSource {
    fn start_capture(
        &mut self,
        layout: &ChannelLayout,
        trigger_rate_hz: u32,
    ) -> Result<(), SourceError> {
        self.max_code = layout.max_code();
        self.trigger_rate_hz = if trigger_rate_hz == 0 {
            NOMINAL_TRIGGER_HZ
        } else {
            trigger_rate_hz
        };
        self.running = true;
        debug!(
            "Synthetic {} source armed: {} channels at {} Hz",
            self.waveform.as_str(),
            layout.channel_count(),
            self.trigger_rate_hz
        );
        Ok(())
    }

    fn convert(&mut self, codes: &mut [u16]) -> Result<(), SourceError> {
        if !self.running {
            return Err(SourceError::NotStarted);
        }

        match self.waveform {
            Waveform::Sine => {
                for (channel, code) in codes.iter_mut().enumerate() {
                    *code = self.sine_code(channel) as u16;
                }
            }
            Waveform::Ramp => {
                codes.fill(self.ramp as u16);
                self.ramp += RAMP_STEP;
                if self.ramp > self.max_code {
                    self.ramp = 0;
                }
            }
        }

        self.tick += 1;
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::rms;

    #[test]
    fn test_convert_requires_start() {
        let mut source = SyntheticSource::sine(vec![100]);
        let mut codes = [0u16; 1];
        assert_eq!(source.convert(&mut codes), Err(SourceError::NotStarted));
    }

    #[test]
    fn test_sine_rms_close_to_target() {
        let layout = ChannelLayout::new(1, 60, 12).unwrap();
        let mut source = SyntheticSource::sine(vec![400]);
        source.start_capture(&layout, 600).unwrap();

        let mut samples = Vec::new();
        let mut codes = [0u16; 1];
        for _ in 0..60 {
            source.convert(&mut codes).unwrap();
            samples.push(codes[0] as i32);
        }

        // 60 samples = 5 whole mains periods
        let measured = rms(&samples).unwrap();
        assert!((398..=401).contains(&measured), "rms was {}", measured);
    }

    #[test]
    fn test_sine_clamped_to_resolution() {
        let layout = ChannelLayout::new(1, 12, 8).unwrap();
        let mut source = SyntheticSource::sine(vec![10_000]);
        source.start_capture(&layout, 600).unwrap();

        let mut codes = [0u16; 1];
        for _ in 0..12 {
            source.convert(&mut codes).unwrap();
            assert!(codes[0] <= 255);
        }
    }

    #[test]
    fn test_ramp_wraps_at_full_scale() {
        let layout = ChannelLayout::new(2, 4, 6).unwrap();
        let mut source = SyntheticSource::ramp();
        source.start_capture(&layout, 0).unwrap();

        let mut codes = [0u16; 2];
        let mut seen = Vec::new();
        for _ in 0..5 {
            source.convert(&mut codes).unwrap();
            assert_eq!(codes[0], codes[1]);
            seen.push(codes[0]);
        }
        // max code 63: 0, 20, 40, 60, then wrap
        assert_eq!(seen, vec![0, 20, 40, 60, 0]);
    }

    #[test]
    fn test_pad_skew_splits_amplitude() {
        let source = SyntheticSource::pads_and_coils(500, 300, 100);
        assert_eq!(source.amplitudes, vec![550, 450, 300, 300]);
    }
}
