//! Capture thread driving the sampler at the trigger rate
//!
//! Stands in for the hardware timer and transfer-complete interrupt: a
//! dedicated thread ticks the sampler on an `Instant` deadline schedule,
//! handles completion, and re-arms once the consumer hands the buffer back.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::handoff::{frame_channel, FrameReceiver, FrameWait};
use super::layout::{CaptureVariant, ChannelLayout};
use super::sampler::{CaptureError, CaptureStats, ChannelSampler, SamplerState, TickOutcome};
use super::source::SampleSource;

/// How long the capture thread waits for the buffer before re-checking
/// the running flag
const REARM_POLL: Duration = Duration::from_millis(50);

/// Back-off after a converter fault
const FAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub layout: ChannelLayout,
    pub variant: CaptureVariant,
    /// Trigger rate; 0 runs conversions back to back
    pub trigger_rate_hz: u32,
    pub frame_wait: FrameWait,
    /// Stop after this many frames; 0 runs until stopped
    pub max_frames: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            layout: ChannelLayout::default(),
            variant: CaptureVariant::Scan,
            trigger_rate_hz: 600,
            frame_wait: FrameWait::Blocking,
            max_frames: 0,
        }
    }
}

/// Capture controller
pub struct CaptureController {
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    reset_requested: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureController {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            reset_requested: Arc::new(AtomicBool::new(false)),
            stats: CaptureStats::new(),
            handle: Mutex::new(None),
        }
    }

    /// Start capturing from `source` and return the consuming end of the
    /// frame handoff
    pub fn start<S: SampleSource + 'static>(&self, source: S) -> Result<FrameReceiver> {
        let layout = self.config.layout;
        info!("===========================================");
        info!("  Starting ADC Capture");
        info!("===========================================");
        info!("  Variant: {}", self.config.variant.as_str());
        info!(
            "  Frame: {} channels x {} samples ({} values)",
            layout.channel_count(),
            layout.samples_per_channel(),
            layout.capacity()
        );
        info!("  Resolution: {} bits", layout.resolution_bits());
        if self.config.trigger_rate_hz == 0 {
            info!("  Trigger: free running");
        } else {
            info!("  Trigger: {} Hz", self.config.trigger_rate_hz);
        }

        if self.running.swap(true, Ordering::SeqCst) {
            anyhow::bail!("Capture already running");
        }

        let (publisher, receiver) = frame_channel(self.config.frame_wait);
        let sampler = ChannelSampler::configure(
            layout,
            self.config.variant,
            self.config.trigger_rate_hz,
            source,
            publisher,
        )
        .map(|s| s.with_stats(self.stats.clone()))
        .inspect_err(|_| self.running.store(false, Ordering::SeqCst))
        .context("Failed to configure sampler")?;

        let running = self.running.clone();
        let reset_requested = self.reset_requested.clone();
        let max_frames = self.config.max_frames;

        let handle = thread::Builder::new()
            .name("adc-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_capture(sampler, &running, &reset_requested, max_frames) {
                    error!("ADC capture error: {:#}", e);
                }
                running.store(false, Ordering::SeqCst);
            })
            .context("Failed to spawn capture thread")?;

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }

        Ok(receiver)
    }

    /// Abort the frame in progress and start a fresh one from offset 0.
    ///
    /// A frame already handed to the consumer is unaffected; the sampler
    /// resets as soon as it comes back.
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::SeqCst);
    }

    /// Stop capturing and wait for the capture thread
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping ADC capture...");
        }
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Capture thread panicked");
            }
        }
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get statistics
    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Main capture loop (runs in dedicated thread)
fn run_capture<S: SampleSource>(
    mut sampler: ChannelSampler<S>,
    running: &AtomicBool,
    reset_requested: &AtomicBool,
    max_frames: u64,
) -> Result<()> {
    let period = match sampler.trigger_rate_hz() {
        0 => None,
        hz => Some(Duration::from_secs_f64(1.0 / hz as f64)),
    };

    sampler.start().context("Failed to arm sampler")?;
    let mut next_tick = Instant::now();
    let mut first_frame = true;

    while running.load(Ordering::SeqCst) {
        if sampler.state() != SamplerState::Ready && reset_requested.swap(false, Ordering::SeqCst)
        {
            debug!("Reset requested, restarting frame");
            sampler.reset()?;
        }

        match sampler.state() {
            SamplerState::Ready => {
                if !sampler.await_rearm(REARM_POLL)? {
                    continue;
                }
                reset_requested.store(false, Ordering::SeqCst);
                if max_frames > 0 && sampler.stats().snapshot().frames_completed >= max_frames {
                    info!("Captured {} frames, stopping", max_frames);
                    break;
                }
                sampler.start()?;
                next_tick = Instant::now();
            }
            SamplerState::Idle => {
                sampler.start()?;
                next_tick = Instant::now();
            }
            SamplerState::Armed | SamplerState::Sampling => {
                if let Some(period) = period {
                    next_tick += period;
                    let now = Instant::now();
                    if next_tick > now {
                        thread::sleep(next_tick - now);
                    } else if now - next_tick > period {
                        // Fell behind (scheduler stall): resync rather than burst
                        next_tick = now;
                    }
                }

                match sampler.on_tick() {
                    Ok(TickOutcome::TransferComplete) => match sampler.on_transfer_complete() {
                        Ok(()) => {
                            if first_frame {
                                info!("First frame captured!");
                                first_frame = false;
                            }
                        }
                        Err(CaptureError::Disconnected) => {
                            info!("Frame consumer gone, stopping capture");
                            break;
                        }
                        Err(e) => warn!("Transfer completion failed: {}", e),
                    },
                    Ok(TickOutcome::Pending) | Ok(TickOutcome::Ignored) => {}
                    Err(CaptureError::Source(e)) => {
                        error!("Converter error: {}", e);
                        thread::sleep(FAULT_BACKOFF);
                        sampler.reset()?;
                    }
                    Err(e) => warn!("Trigger handling failed: {}", e),
                }
            }
        }
    }

    // Leave the converter stopped; a frame still held by the consumer is fine
    match sampler.reset() {
        Ok(()) | Err(CaptureError::FrameOutstanding) => {}
        Err(e) => debug!("Final reset failed: {}", e),
    }

    info!("ADC capture stopped");
    info!("Final stats: {}", sampler.stats().snapshot());

    Ok(())
}
