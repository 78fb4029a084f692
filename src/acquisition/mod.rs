//! Timer-triggered multi-channel capture
//!
//! This module provides the acquisition side of the pipeline:
//! 1. Fix the frame geometry (channel count, samples per channel, resolution)
//! 2. Convert one round of channels per trigger event
//! 3. Store conversions interleaved, or packed in pairs for dual capture
//! 4. Publish the completed frame and raise the ready flag
//! 5. Re-arm once the consumer returns the cleared buffer

pub mod capture;
mod handoff;
mod layout;
mod sampler;
mod source;

pub use capture::{CaptureConfig, CaptureController};
pub use handoff::{frame_channel, ConsumeError, FramePublisher, FrameReceiver, FrameWait, ReadyFrame};
pub use layout::{
    CaptureVariant, ChannelLayout, LayoutError, RawSampleBuffer, DEFAULT_CHANNEL_COUNT,
    DEFAULT_RESOLUTION_BITS, DEFAULT_SAMPLES_PER_CHANNEL, MAX_CHANNELS,
};
pub use sampler::{
    CaptureError, CaptureStats, CaptureStatsSnapshot, ChannelSampler, SamplerState, TickOutcome,
};
pub use source::{SampleSource, SourceError, SyntheticSource, Waveform};
