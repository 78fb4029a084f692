//! Frame geometry and the raw interleaved sample buffer

use thiserror::Error;

/// Maximum number of channels one converter sequence can visit
pub const MAX_CHANNELS: usize = 4;

/// Default frame geometry: pad1, pad2, coil1, coil2
pub const DEFAULT_CHANNEL_COUNT: usize = 4;
pub const DEFAULT_SAMPLES_PER_CHANNEL: usize = 60;
pub const DEFAULT_RESOLUTION_BITS: u8 = 12;

/// Layout validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("channel count {0} outside 1..=4")]
    ChannelCount(usize),

    #[error("samples per channel must be at least 1")]
    EmptyFrame,

    #[error("resolution of {0} bits outside 1..=16")]
    Resolution(u8),

    #[error("dual capture samples exactly 2 channels, got {0}")]
    DualChannelCount(usize),
}

/// How conversions are produced on each trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureVariant {
    /// One converter visits every channel per trigger
    #[default]
    Scan,
    /// Two converters sample two channels simultaneously, one packed word
    /// per trigger
    Dual,
}

impl CaptureVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureVariant::Scan => "scan",
            CaptureVariant::Dual => "dual",
        }
    }
}

/// Validated frame geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    channel_count: usize,
    samples_per_channel: usize,
    resolution_bits: u8,
}

impl ChannelLayout {
    pub fn new(
        channel_count: usize,
        samples_per_channel: usize,
        resolution_bits: u8,
    ) -> Result<Self, LayoutError> {
        if channel_count == 0 || channel_count > MAX_CHANNELS {
            return Err(LayoutError::ChannelCount(channel_count));
        }
        if samples_per_channel == 0 {
            return Err(LayoutError::EmptyFrame);
        }
        if resolution_bits == 0 || resolution_bits > 16 {
            return Err(LayoutError::Resolution(resolution_bits));
        }

        Ok(Self {
            channel_count,
            samples_per_channel,
            resolution_bits,
        })
    }

    /// Check that `variant` can produce this layout
    pub fn check_variant(&self, variant: CaptureVariant) -> Result<(), LayoutError> {
        match variant {
            CaptureVariant::Scan => Ok(()),
            CaptureVariant::Dual if self.channel_count == 2 => Ok(()),
            CaptureVariant::Dual => Err(LayoutError::DualChannelCount(self.channel_count)),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    pub fn resolution_bits(&self) -> u8 {
        self.resolution_bits
    }

    /// Total number of interleaved values in one frame
    pub fn capacity(&self) -> usize {
        self.channel_count * self.samples_per_channel
    }

    /// Largest code the converter can produce
    pub fn max_code(&self) -> u32 {
        (1u32 << self.resolution_bits) - 1
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            channel_count: DEFAULT_CHANNEL_COUNT,
            samples_per_channel: DEFAULT_SAMPLES_PER_CHANNEL,
            resolution_bits: DEFAULT_RESOLUTION_BITS,
        }
    }
}

/// Interleaved raw frame: index `channel_count * i + c` is sample `i` of
/// channel `c`.
///
/// Allocated once and reused for every frame; the length never changes.
#[derive(Debug)]
pub struct RawSampleBuffer {
    layout: ChannelLayout,
    data: Vec<u32>,
}

impl RawSampleBuffer {
    pub fn new(layout: ChannelLayout) -> Self {
        Self {
            layout,
            data: vec![0; layout.capacity()],
        }
    }

    /// Unallocated stand-in used while the real buffer is moved out
    pub(crate) fn detached(layout: ChannelLayout) -> Self {
        Self {
            layout,
            data: Vec::new(),
        }
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Zero every entry
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn is_zeroed(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Expand `words` packed dual-conversion words stored at the start of the
    /// buffer into `2 * words` channel values.
    ///
    /// Word `i` holds channel 0 in its low half and channel 1 in its high
    /// half; they land at `2i` and `2i + 1`. Words are expanded from the last
    /// one down to the first, since position `2i` is never below `i` and a
    /// forward pass would overwrite words that have not been read yet.
    pub fn unpack_dual(&mut self, words: usize) {
        let words = words.min(self.data.len() / 2);
        for i in (0..words).rev() {
            let packed = self.data[i];
            self.data[2 * i + 1] = packed >> 16;
            self.data[2 * i] = packed & 0xFFFF;
        }
    }
}
