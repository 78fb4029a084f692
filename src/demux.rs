//! Buffer demultiplexer
//!
//! Splits an interleaved raw frame into one signed sequence per channel.

use crate::acquisition::{ChannelLayout, RawSampleBuffer, ReadyFrame};

/// Conversion order of the four-channel front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Pad1 = 0,
    Pad2 = 1,
    Coil1 = 2,
    Coil2 = 3,
}

impl Channel {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-channel sample arrays, overwritten wholesale every frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    channels: Vec<Vec<i32>>,
}

impl ChannelSet {
    pub fn new(layout: &ChannelLayout) -> Self {
        Self {
            channels: vec![vec![0; layout.samples_per_channel()]; layout.channel_count()],
        }
    }

    /// `channel[c][i] = raw[channel_count * i + c]`
    pub fn fill_from(&mut self, raw: &RawSampleBuffer) {
        let layout = raw.layout();
        let count = layout.channel_count();
        let n = layout.samples_per_channel();

        self.channels.resize_with(count, Vec::new);
        for channel in &mut self.channels {
            channel.resize(n, 0);
        }

        for (i, round) in raw.as_slice().chunks_exact(count).take(n).enumerate() {
            for (c, &value) in round.iter().enumerate() {
                self.channels[c][i] = value as i32;
            }
        }
    }

    /// Demultiplex a ready frame and acknowledge it.
    ///
    /// Consuming the frame zeroes the raw buffer, clears the ready flag and
    /// lets the sampler re-arm.
    pub fn demultiplex(&mut self, frame: ReadyFrame<'_>) {
        self.fill_from(frame.buffer());
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn samples_per_channel(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Samples of channel `index`; empty if the frame has no such channel
    pub fn channel(&self, index: usize) -> &[i32] {
        self.channels.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, channel: Channel) -> &[i32] {
        self.channel(channel.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{frame_channel, ChannelSampler, FrameWait, SampleSource, SourceError};

    fn raw_buffer(layout: ChannelLayout, values: &[u32]) -> RawSampleBuffer {
        let mut raw = RawSampleBuffer::new(layout);
        raw.as_mut_slice().copy_from_slice(values);
        raw
    }

    #[test]
    fn test_four_channel_split() {
        let layout = ChannelLayout::new(4, 3, 12).unwrap();
        let raw: Vec<u32> = (0..12).collect();
        let mut set = ChannelSet::new(&layout);
        set.fill_from(&raw_buffer(layout, &raw));

        assert_eq!(set.get(Channel::Pad1), &[0, 4, 8]);
        assert_eq!(set.get(Channel::Pad2), &[1, 5, 9]);
        assert_eq!(set.get(Channel::Coil1), &[2, 6, 10]);
        assert_eq!(set.get(Channel::Coil2), &[3, 7, 11]);
    }

    #[test]
    fn test_channel_index_property() {
        let layout = ChannelLayout::default();
        let raw: Vec<u32> = (0..240u32).map(|i| (i * 97 + 13) % 4096).collect();
        let mut set = ChannelSet::new(&layout);
        set.fill_from(&raw_buffer(layout, &raw));

        for c in 0..4 {
            let expected: Vec<i32> = (0..60).map(|i| raw[4 * i + c] as i32).collect();
            assert_eq!(set.channel(c), expected.as_slice());
        }
    }

    #[test]
    fn test_overwritten_each_frame() {
        let layout = ChannelLayout::new(2, 2, 12).unwrap();
        let mut set = ChannelSet::new(&layout);
        set.fill_from(&raw_buffer(layout, &[1, 2, 3, 4]));
        set.fill_from(&raw_buffer(layout, &[9, 8, 7, 6]));

        assert_eq!(set.channel(0), &[9, 7]);
        assert_eq!(set.channel(1), &[8, 6]);
    }

    #[test]
    fn test_missing_channel_is_empty() {
        let layout = ChannelLayout::new(2, 2, 12).unwrap();
        let set = ChannelSet::new(&layout);
        assert!(set.get(Channel::Coil2).is_empty());
        assert_eq!(set.channel_count(), 2);
        assert_eq!(set.samples_per_channel(), 2);
    }

    struct Constant(u16);

    impl SampleSource for Constant {
        fn start_capture(&mut self, _: &ChannelLayout, _: u32) -> Result<(), SourceError> {
            Ok(())
        }

        fn convert(&mut self, codes: &mut [u16]) -> Result<(), SourceError> {
            codes.fill(self.0);
            Ok(())
        }

        fn stop_capture(&mut self) {}
    }

    #[test]
    fn test_demultiplex_acknowledges_frame() {
        let layout = ChannelLayout::new(2, 3, 12).unwrap();
        let (publisher, receiver) = frame_channel(FrameWait::Blocking);
        let mut sampler = ChannelSampler::configure(
            layout,
            Default::default(),
            0,
            Constant(7),
            publisher,
        )
        .unwrap();

        sampler.start().unwrap();
        for _ in 0..3 {
            sampler.on_tick().unwrap();
        }
        sampler.on_transfer_complete().unwrap();
        assert!(receiver.is_ready());

        let mut set = ChannelSet::new(&layout);
        set.demultiplex(receiver.recv().unwrap());

        assert_eq!(set.channel(0), &[7, 7, 7]);
        assert!(!receiver.is_ready());
        sampler.reset().unwrap();
        assert!(sampler.buffer().unwrap().is_zeroed());
    }
}
