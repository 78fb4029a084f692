//! Channel sampler state machine
//!
//! ```text
//!   start()          first tick          transfer complete
//! Idle ─────▶ Armed ──────────▶ Sampling ─────────────────▶ Ready
//!  ▲                                                          │
//!  └──────────────────────── reset() ◀────────────────────────┘
//!                  (after the consumer returned the buffer)
//! ```
//!
//! The sampler is sans-IO: the timer calls [`ChannelSampler::on_tick`] and the
//! transfer-complete interrupt calls [`ChannelSampler::on_transfer_complete`].
//! On the host both are driven by the capture thread in `capture.rs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::handoff::FramePublisher;
use super::layout::{CaptureVariant, ChannelLayout, LayoutError, RawSampleBuffer, MAX_CHANNELS};
use super::source::{SampleSource, SourceError};

/// Capture errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("invalid layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("a frame is already armed or in flight")]
    AlreadyArmed,

    #[error("transfer overrun: all {capacity} buffer slots already written")]
    BufferOverrun { capacity: usize },

    #[error("frame collision: previous frame not yet consumed")]
    FrameCollision,

    #[error("transfer incomplete: {written} of {expected} transfers done")]
    IncompleteTransfer { written: usize, expected: usize },

    #[error("published frame is still held by the consumer")]
    FrameOutstanding,

    #[error("frame consumer disconnected")]
    Disconnected,

    #[error("converter error: {0}")]
    Source(#[from] SourceError),
}

/// Sampler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Armed,
    Sampling,
    Ready,
}

/// Result of one trigger event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Trigger disabled (idle or frame ready), nothing converted
    Ignored,
    /// Conversion stored, transfer still running
    Pending,
    /// Last transfer of the frame stored
    TransferComplete,
}

/// Capture statistics (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub ticks: AtomicU64,
    pub frames_completed: AtomicU64,
    pub overruns: AtomicU64,
    pub collisions: AtomicU64,
    pub resets: AtomicU64,
    pub source_errors: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_completed: self.frames_completed.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStatsSnapshot {
    pub ticks: u64,
    pub frames_completed: u64,
    pub overruns: u64,
    pub collisions: u64,
    pub resets: u64,
    pub source_errors: u64,
}

impl std::fmt::Display for CaptureStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frames: {} | Ticks: {} | Overruns: {} | Collisions: {} | Resets: {} | Source errors: {}",
            self.frames_completed,
            self.ticks,
            self.overruns,
            self.collisions,
            self.resets,
            self.source_errors
        )
    }
}

/// Timer-triggered sampler filling one interleaved frame per activation
pub struct ChannelSampler<S: SampleSource> {
    layout: ChannelLayout,
    variant: CaptureVariant,
    trigger_rate_hz: u32,
    source: S,
    state: SamplerState,
    /// `None` only while the frame is published to the consumer
    buffer: Option<RawSampleBuffer>,
    /// Transfer units written: values for scan, packed words for dual
    transferred: usize,
    publisher: FramePublisher,
    stats: Arc<CaptureStats>,
}

impl<S: SampleSource> ChannelSampler<S> {
    /// Validate the layout for `variant` and allocate the frame buffer
    pub fn configure(
        layout: ChannelLayout,
        variant: CaptureVariant,
        trigger_rate_hz: u32,
        source: S,
        publisher: FramePublisher,
    ) -> Result<Self, CaptureError> {
        layout.check_variant(variant)?;

        debug!(
            "Sampler configured: {} x {} at {} bits, {} variant, buffer {} values",
            layout.channel_count(),
            layout.samples_per_channel(),
            layout.resolution_bits(),
            variant.as_str(),
            layout.capacity()
        );

        Ok(Self {
            layout,
            variant,
            trigger_rate_hz,
            source,
            state: SamplerState::Idle,
            buffer: Some(RawSampleBuffer::new(layout)),
            transferred: 0,
            publisher,
            stats: CaptureStats::new(),
        })
    }

    /// Share an existing statistics block
    pub fn with_stats(mut self, stats: Arc<CaptureStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Arm trigger and transfer, writing from offset 0
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != SamplerState::Idle {
            return Err(CaptureError::AlreadyArmed);
        }

        self.source.start_capture(&self.layout, self.trigger_rate_hz)?;
        self.transferred = 0;
        self.state = SamplerState::Armed;
        Ok(())
    }

    /// Handle one trigger event
    pub fn on_tick(&mut self) -> Result<TickOutcome, CaptureError> {
        match self.state {
            SamplerState::Idle | SamplerState::Ready => return Ok(TickOutcome::Ignored),
            SamplerState::Armed => self.state = SamplerState::Sampling,
            SamplerState::Sampling => {}
        }

        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let expected = self.transfer_len();
        if self.transferred >= expected {
            self.stats.overruns.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Trigger after transfer complete, dropping conversion ({} values)",
                self.layout.capacity()
            );
            return Err(CaptureError::BufferOverrun {
                capacity: self.layout.capacity(),
            });
        }

        let channels = self.layout.channel_count();
        let mut codes = [0u16; MAX_CHANNELS];
        if let Err(e) = self.source.convert(&mut codes[..channels]) {
            self.stats.source_errors.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }

        let mask = self.layout.max_code();
        let Some(buffer) = self.buffer.as_mut() else {
            // Sampling always owns the buffer
            return Err(CaptureError::FrameOutstanding);
        };
        let slots = buffer.as_mut_slice();

        match self.variant {
            CaptureVariant::Scan => {
                let start = self.transferred;
                for (slot, &code) in slots[start..start + channels].iter_mut().zip(&codes) {
                    *slot = code as u32 & mask;
                }
                self.transferred += channels;
            }
            CaptureVariant::Dual => {
                let low = codes[0] as u32 & mask;
                let high = codes[1] as u32 & mask;
                slots[self.transferred] = (high << 16) | low;
                self.transferred += 1;
            }
        }

        if self.transferred == expected {
            Ok(TickOutcome::TransferComplete)
        } else {
            Ok(TickOutcome::Pending)
        }
    }

    /// Transfer-complete handler: stop conversions, publish the frame, raise
    /// the ready flag.
    ///
    /// A second completion while the previous frame is unconsumed is rejected
    /// and changes nothing.
    pub fn on_transfer_complete(&mut self) -> Result<(), CaptureError> {
        if self.state == SamplerState::Ready {
            self.stats.collisions.fetch_add(1, Ordering::Relaxed);
            warn!("Transfer complete while previous frame unconsumed, rejecting");
            return Err(CaptureError::FrameCollision);
        }

        let expected = self.transfer_len();
        if self.state != SamplerState::Sampling || self.transferred < expected {
            return Err(CaptureError::IncompleteTransfer {
                written: self.transferred,
                expected,
            });
        }

        self.source.stop_capture();

        let Some(mut buffer) = self.buffer.take() else {
            return Err(CaptureError::FrameOutstanding);
        };
        if self.variant == CaptureVariant::Dual {
            buffer.unpack_dual(self.layout.samples_per_channel());
        }

        match self.publisher.publish(buffer) {
            Ok(()) => {
                self.state = SamplerState::Ready;
                self.stats.frames_completed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(buffer) => {
                self.buffer = Some(buffer);
                if self.publisher.is_ready() {
                    self.stats.collisions.fetch_add(1, Ordering::Relaxed);
                    warn!("Frame slot still occupied, dropping new frame");
                    Err(CaptureError::FrameCollision)
                } else {
                    Err(CaptureError::Disconnected)
                }
            }
        }
    }

    /// Zero the buffer, clear the ready flag and return to idle.
    ///
    /// Also aborts a capture in progress. Fails with `FrameOutstanding` while
    /// the consumer still holds the published frame.
    pub fn reset(&mut self) -> Result<(), CaptureError> {
        if self.buffer.is_none() {
            match self.publisher.try_reclaim() {
                Some(buffer) => self.buffer = Some(buffer),
                None => return Err(CaptureError::FrameOutstanding),
            }
        }

        if matches!(self.state, SamplerState::Armed | SamplerState::Sampling) {
            self.source.stop_capture();
            debug!(
                "Capture aborted after {} of {} transfers",
                self.transferred,
                self.transfer_len()
            );
        }

        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }
        self.transferred = 0;
        self.publisher.clear_ready();
        self.state = SamplerState::Idle;
        self.stats.resets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Wait up to `timeout` for the consumer to return the published buffer,
    /// then reset.
    ///
    /// Returns `true` once the sampler is idle and can be started again.
    pub fn await_rearm(&mut self, timeout: Duration) -> Result<bool, CaptureError> {
        if self.buffer.is_none() {
            match self.publisher.reclaim_timeout(timeout) {
                Some(buffer) => self.buffer = Some(buffer),
                None => return Ok(false),
            }
        }
        self.reset()?;
        Ok(true)
    }

    /// Number of transfers in one frame
    fn transfer_len(&self) -> usize {
        match self.variant {
            CaptureVariant::Scan => self.layout.capacity(),
            CaptureVariant::Dual => self.layout.samples_per_channel(),
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn trigger_rate_hz(&self) -> u32 {
        self.trigger_rate_hz
    }

    pub fn is_ready(&self) -> bool {
        self.publisher.is_ready()
    }

    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }

    /// Raw buffer while owned by the sampler (not while published)
    pub fn buffer(&self) -> Option<&RawSampleBuffer> {
        self.buffer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::handoff::{frame_channel, FrameReceiver, FrameWait};

    /// Emits `100 * (channel + 1) + tick` on every channel
    struct CountingSource {
        tick: u16,
        running: bool,
    }

    impl CountingSource {
        fn new() -> Self {
            Self { tick: 0, running: false }
        }
    }

    impl SampleSource for CountingSource {
        fn start_capture(&mut self, _: &ChannelLayout, _: u32) -> Result<(), SourceError> {
            self.running = true;
            self.tick = 0;
            Ok(())
        }

        fn convert(&mut self, codes: &mut [u16]) -> Result<(), SourceError> {
            if !self.running {
                return Err(SourceError::NotStarted);
            }
            for (channel, code) in codes.iter_mut().enumerate() {
                *code = 100 * (channel as u16 + 1) + self.tick;
            }
            self.tick += 1;
            Ok(())
        }

        fn stop_capture(&mut self) {
            self.running = false;
        }
    }

    fn sampler(
        layout: ChannelLayout,
        variant: CaptureVariant,
    ) -> (ChannelSampler<CountingSource>, FrameReceiver) {
        let (publisher, receiver) = frame_channel(FrameWait::Blocking);
        let sampler =
            ChannelSampler::configure(layout, variant, 0, CountingSource::new(), publisher)
                .unwrap();
        (sampler, receiver)
    }

    fn run_to_completion<S: SampleSource>(sampler: &mut ChannelSampler<S>) {
        sampler.start().unwrap();
        while sampler.on_tick().unwrap() != TickOutcome::TransferComplete {}
        sampler.on_transfer_complete().unwrap();
    }

    #[test]
    fn test_state_machine_cycle() {
        let layout = ChannelLayout::new(4, 3, 12).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Scan);
        assert_eq!(sampler.state(), SamplerState::Idle);

        sampler.start().unwrap();
        assert_eq!(sampler.state(), SamplerState::Armed);

        assert_eq!(sampler.on_tick().unwrap(), TickOutcome::Pending);
        assert_eq!(sampler.state(), SamplerState::Sampling);
        assert_eq!(sampler.on_tick().unwrap(), TickOutcome::Pending);
        assert_eq!(sampler.on_tick().unwrap(), TickOutcome::TransferComplete);

        assert!(!receiver.is_ready());
        sampler.on_transfer_complete().unwrap();
        assert_eq!(sampler.state(), SamplerState::Ready);
        assert!(receiver.is_ready());

        drop(receiver.recv().unwrap());
        sampler.reset().unwrap();
        assert_eq!(sampler.state(), SamplerState::Idle);
        assert!(sampler.buffer().unwrap().is_zeroed());
        assert!(!sampler.is_ready());
    }

    #[test]
    fn test_scan_interleaves_channels() {
        let layout = ChannelLayout::new(4, 3, 12).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Scan);
        run_to_completion(&mut sampler);

        let frame = receiver.recv().unwrap();
        assert_eq!(
            frame.raw(),
            &[100, 200, 300, 400, 101, 201, 301, 401, 102, 202, 302, 402]
        );
    }

    #[test]
    fn test_dual_unpacks_to_interleaved_layout() {
        let layout = ChannelLayout::new(2, 4, 12).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Dual);

        sampler.start().unwrap();
        for _ in 0..3 {
            assert_eq!(sampler.on_tick().unwrap(), TickOutcome::Pending);
        }
        assert_eq!(sampler.on_tick().unwrap(), TickOutcome::TransferComplete);
        sampler.on_transfer_complete().unwrap();

        let frame = receiver.recv().unwrap();
        assert_eq!(frame.raw(), &[100, 200, 101, 201, 102, 202, 103, 203]);
    }

    #[test]
    fn test_dual_rejects_four_channels() {
        let (publisher, _receiver) = frame_channel(FrameWait::Blocking);
        let result = ChannelSampler::configure(
            ChannelLayout::default(),
            CaptureVariant::Dual,
            600,
            CountingSource::new(),
            publisher,
        );
        assert!(matches!(
            result,
            Err(CaptureError::Layout(LayoutError::DualChannelCount(4)))
        ));
    }

    #[test]
    fn test_start_while_armed_fails() {
        let layout = ChannelLayout::new(1, 2, 12).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Scan);

        sampler.start().unwrap();
        assert_eq!(sampler.start(), Err(CaptureError::AlreadyArmed));

        sampler.on_tick().unwrap();
        assert_eq!(sampler.start(), Err(CaptureError::AlreadyArmed));

        sampler.on_tick().unwrap();
        sampler.on_transfer_complete().unwrap();
        assert_eq!(sampler.start(), Err(CaptureError::AlreadyArmed));
        drop(receiver);
    }

    #[test]
    fn test_reentrant_completion_is_rejected() {
        let layout = ChannelLayout::new(2, 2, 12).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Scan);
        run_to_completion(&mut sampler);

        assert_eq!(sampler.on_transfer_complete(), Err(CaptureError::FrameCollision));
        assert_eq!(sampler.on_transfer_complete(), Err(CaptureError::FrameCollision));
        assert_eq!(sampler.stats().snapshot().collisions, 2);
        assert_eq!(sampler.stats().snapshot().frames_completed, 1);

        // Original frame intact
        let frame = receiver.recv().unwrap();
        assert_eq!(frame.raw(), &[100, 200, 101, 201]);
    }

    #[test]
    fn test_ticks_ignored_while_ready() {
        let layout = ChannelLayout::new(2, 2, 12).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Scan);
        run_to_completion(&mut sampler);

        assert_eq!(sampler.on_tick().unwrap(), TickOutcome::Ignored);
        let frame = receiver.recv().unwrap();
        assert_eq!(frame.raw(), &[100, 200, 101, 201]);
    }

    #[test]
    fn test_overrun_never_writes_past_capacity() {
        let layout = ChannelLayout::new(2, 2, 12).unwrap();
        let (mut sampler, _receiver) = sampler(layout, CaptureVariant::Scan);
        sampler.start().unwrap();
        sampler.on_tick().unwrap();
        assert_eq!(sampler.on_tick().unwrap(), TickOutcome::TransferComplete);

        // Completion not yet handled, trigger fires again
        assert_eq!(
            sampler.on_tick(),
            Err(CaptureError::BufferOverrun { capacity: 4 })
        );
        assert_eq!(sampler.buffer().unwrap().len(), 4);
        assert_eq!(sampler.stats().snapshot().overruns, 1);
    }

    #[test]
    fn test_completion_before_full_is_rejected() {
        let layout = ChannelLayout::new(2, 3, 12).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Scan);
        sampler.start().unwrap();
        sampler.on_tick().unwrap();

        assert_eq!(
            sampler.on_transfer_complete(),
            Err(CaptureError::IncompleteTransfer { written: 2, expected: 6 })
        );
        assert!(!receiver.is_ready());
    }

    #[test]
    fn test_reset_with_frame_outstanding() {
        let layout = ChannelLayout::new(1, 1, 12).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Scan);
        run_to_completion(&mut sampler);

        {
            let _frame = receiver.recv().unwrap();
            assert_eq!(sampler.reset(), Err(CaptureError::FrameOutstanding));
        }

        assert_eq!(sampler.reset(), Ok(()));
        assert_eq!(sampler.state(), SamplerState::Idle);
    }

    #[test]
    fn test_reset_aborts_capture_in_progress() {
        let layout = ChannelLayout::new(2, 4, 12).unwrap();
        let (mut sampler, _receiver) = sampler(layout, CaptureVariant::Scan);
        sampler.start().unwrap();
        sampler.on_tick().unwrap();

        sampler.reset().unwrap();
        assert_eq!(sampler.state(), SamplerState::Idle);
        assert!(sampler.buffer().unwrap().is_zeroed());

        // Fresh frame starts from offset 0
        run_to_completion(&mut sampler);
        assert!(sampler.is_ready());
    }

    #[test]
    fn test_await_rearm() {
        let layout = ChannelLayout::new(1, 2, 12).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Scan);
        run_to_completion(&mut sampler);

        assert_eq!(sampler.await_rearm(Duration::from_millis(5)), Ok(false));
        drop(receiver.recv().unwrap());
        assert_eq!(sampler.await_rearm(Duration::from_millis(5)), Ok(true));
        assert_eq!(sampler.state(), SamplerState::Idle);
    }

    #[test]
    fn test_codes_masked_to_resolution() {
        let layout = ChannelLayout::new(2, 1, 8).unwrap();
        let (mut sampler, receiver) = sampler(layout, CaptureVariant::Scan);
        run_to_completion(&mut sampler);

        // 100 and 200 fit in 8 bits, 300 would not
        let frame = receiver.recv().unwrap();
        assert!(frame.raw().iter().all(|&v| v <= 255));
    }
}
