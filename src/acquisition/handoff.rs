//! Single-frame handoff between the completion context and the consumer
//!
//! ```text
//! capture thread                          foreground
//! ──────────────                          ──────────
//! ready = true (Release)
//! frame_tx.send(buffer) ───────────────▶ frame_rx.recv()
//!                                          demultiplex
//!                                          buffer.clear()
//!                                          ready = false (Release)
//! rearm_rx.recv()  ◀────────────────────── rearm_tx.send(buffer)
//! ```
//!
//! There is exactly one [`RawSampleBuffer`] and both channels have capacity
//! one, so at most one frame is ever in flight. Moving the buffer through the
//! channel orders every sample write before the consumer's first read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;
use tracing::{trace, warn};

use super::layout::RawSampleBuffer;

/// How the consumer waits for the next frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameWait {
    /// Wait until a frame arrives, however long that takes
    #[default]
    Blocking,
    /// Give up after the given duration
    Timeout(Duration),
}

impl FrameWait {
    /// `0` keeps the blocking default
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            FrameWait::Blocking
        } else {
            FrameWait::Timeout(Duration::from_millis(ms))
        }
    }
}

/// Consumer-side errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConsumeError {
    #[error("no frame completed within {0:?}")]
    Timeout(Duration),

    #[error("capture side disconnected")]
    Disconnected,
}

/// Publishing half, owned by the sampler
pub struct FramePublisher {
    frame_tx: Sender<RawSampleBuffer>,
    rearm_rx: Receiver<RawSampleBuffer>,
    ready: Arc<AtomicBool>,
}

impl FramePublisher {
    /// Publish a completed frame.
    ///
    /// Hands the buffer back if the slot is still occupied or the consumer is
    /// gone, so the caller never loses its only buffer.
    pub(crate) fn publish(&self, buffer: RawSampleBuffer) -> Result<(), RawSampleBuffer> {
        // Single producer: nobody else can fill the slot between check and send
        if self.frame_tx.is_full() {
            return Err(buffer);
        }

        self.ready.store(true, Ordering::Release);
        match self.frame_tx.try_send(buffer) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.ready.store(false, Ordering::Release);
                Err(e.into_inner())
            }
        }
    }

    /// Take back a buffer the consumer has cleared, if one is waiting
    pub(crate) fn try_reclaim(&self) -> Option<RawSampleBuffer> {
        match self.rearm_rx.try_recv() {
            Ok(buffer) => Some(buffer),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the consumer to hand the buffer back
    pub(crate) fn reclaim_timeout(&self, timeout: Duration) -> Option<RawSampleBuffer> {
        self.rearm_rx.recv_timeout(timeout).ok()
    }

    /// True while a published frame has not been consumed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn clear_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

/// Consuming half, owned by the foreground loop
pub struct FrameReceiver {
    frame_rx: Receiver<RawSampleBuffer>,
    rearm_tx: Sender<RawSampleBuffer>,
    ready: Arc<AtomicBool>,
    wait: FrameWait,
}

impl FrameReceiver {
    /// "Data ready for consumption" signal
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Wait for the next frame according to the wait policy
    pub fn recv(&self) -> Result<ReadyFrame<'_>, ConsumeError> {
        let buffer = match self.wait {
            FrameWait::Blocking => self
                .frame_rx
                .recv()
                .map_err(|_| ConsumeError::Disconnected)?,
            FrameWait::Timeout(timeout) => {
                self.frame_rx.recv_timeout(timeout).map_err(|e| match e {
                    RecvTimeoutError::Timeout => ConsumeError::Timeout(timeout),
                    RecvTimeoutError::Disconnected => ConsumeError::Disconnected,
                })?
            }
        };

        Ok(ReadyFrame {
            buffer,
            receiver: self,
        })
    }

    /// Non-blocking poll
    pub fn try_recv(&self) -> Option<ReadyFrame<'_>> {
        self.frame_rx.try_recv().ok().map(|buffer| ReadyFrame {
            buffer,
            receiver: self,
        })
    }

    fn acknowledge(&self, mut buffer: RawSampleBuffer) {
        buffer.clear();
        self.ready.store(false, Ordering::Release);
        trace!("Frame consumed, buffer returned for re-arm");
        if self.rearm_tx.try_send(buffer).is_err() {
            warn!("Capture side gone, dropping returned buffer");
        }
    }
}

/// A fully captured frame held by the consumer.
///
/// Dropping it zeroes the buffer, clears the ready flag and hands the buffer
/// back to the sampler: that is the re-arm acknowledgment.
pub struct ReadyFrame<'a> {
    buffer: RawSampleBuffer,
    receiver: &'a FrameReceiver,
}

impl ReadyFrame<'_> {
    pub fn buffer(&self) -> &RawSampleBuffer {
        &self.buffer
    }

    pub fn raw(&self) -> &[u32] {
        self.buffer.as_slice()
    }
}

impl Drop for ReadyFrame<'_> {
    fn drop(&mut self) {
        let layout = *self.buffer.layout();
        let buffer = std::mem::replace(&mut self.buffer, RawSampleBuffer::detached(layout));
        self.receiver.acknowledge(buffer);
    }
}

/// Create a connected publisher/receiver pair
pub fn frame_channel(wait: FrameWait) -> (FramePublisher, FrameReceiver) {
    let (frame_tx, frame_rx) = bounded::<RawSampleBuffer>(1);
    let (rearm_tx, rearm_rx) = bounded::<RawSampleBuffer>(1);
    let ready = Arc::new(AtomicBool::new(false));

    (
        FramePublisher {
            frame_tx,
            rearm_rx,
            ready: ready.clone(),
        },
        FrameReceiver {
            frame_rx,
            rearm_tx,
            ready,
            wait,
        },
    )
}
