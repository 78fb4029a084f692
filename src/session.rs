//! Measurement session - the foreground consumer loop
//!
//! Waits for each ready frame, demultiplexes it (which acknowledges the frame
//! and lets the sampler re-arm), evaluates every estimate and hands the result
//! to the presentation layer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::acquisition::{CaptureStats, ChannelLayout, ConsumeError, FrameReceiver, ReadyFrame};
use crate::demux::ChannelSet;
use crate::estimator::{Estimator, Measurement, MeasurementMode, Reading};

/// Presentation layer: receives read-only channel data and results
pub trait Presenter {
    fn present(&mut self, measurement: &Measurement, channels: &ChannelSet);
}

/// One-line summary of a measurement.
///
/// When either distance is out of range only "OUT OF RANGE" and the bearing
/// are shown; current readings are meaningless without a fix.
pub fn describe(measurement: &Measurement) -> String {
    let angle = match measurement.bearing {
        Some(bearing) => format!("{}° {}", bearing.angle, bearing.direction.as_str()),
        None => Reading::OutOfRange.to_string(),
    };
    let head = format!("#{} {}", measurement.sequence, measurement.mode.as_str());

    if measurement.is_out_of_range() {
        return format!("{} | OUT OF RANGE | angle {}", head, angle);
    }

    format!(
        "{} | distance {} (quick {}) | angle {} | current {} (quick {})",
        head,
        with_unit(measurement.distance_accurate, "mm"),
        with_unit(measurement.distance_quick, "mm"),
        angle,
        with_unit(measurement.current_accurate, "mA"),
        with_unit(measurement.current_quick, "mA"),
    )
}

fn with_unit(reading: Reading, unit: &str) -> String {
    match reading {
        Reading::Value(v) => format!("{} {}", v, unit),
        Reading::OutOfRange => reading.to_string(),
    }
}

/// Presenter that writes every measurement to the log
#[derive(Debug, Default)]
pub struct LogPresenter {
    shown: u64,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl Presenter for LogPresenter {
    fn present(&mut self, measurement: &Measurement, channels: &ChannelSet) {
        self.shown += 1;
        info!("{}", describe(measurement));
        debug!(
            "  {} channels x {} samples at {}",
            channels.channel_count(),
            channels.samples_per_channel(),
            measurement.timestamp.format("%H:%M:%S%.3f")
        );
    }
}

/// Session statistics (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct SessionStats {
    pub frames_consumed: AtomicU64,
    pub out_of_range: AtomicU64,
    pub timeouts: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_frame(&self) {
        self.frames_consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_out_of_range(&self) {
        self.out_of_range.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_frames(&self) -> u64 {
        self.frames_consumed.load(Ordering::Relaxed)
    }

    pub fn get_out_of_range(&self) -> u64 {
        self.out_of_range.load(Ordering::Relaxed)
    }

    pub fn get_timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}

/// Foreground consumer
pub struct MeasurementSession {
    estimator: Estimator,
    mode: MeasurementMode,
    channels: ChannelSet,
    sequence: u64,
    report_interval: Duration,
    stats: Arc<SessionStats>,
    capture_stats: Option<Arc<CaptureStats>>,
}

impl MeasurementSession {
    pub fn new(estimator: Estimator, mode: MeasurementMode, layout: &ChannelLayout) -> Self {
        Self {
            estimator,
            mode,
            channels: ChannelSet::new(layout),
            sequence: 0,
            report_interval: Duration::from_secs(10),
            stats: SessionStats::new(),
            capture_stats: None,
        }
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Include capture counters in the periodic summary
    pub fn with_capture_stats(mut self, stats: Arc<CaptureStats>) -> Self {
        self.capture_stats = Some(stats);
        self
    }

    pub fn mode(&self) -> MeasurementMode {
        self.mode
    }

    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    /// Channel arrays of the most recent frame
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Demultiplex one ready frame and evaluate it
    pub fn process_frame(&mut self, frame: ReadyFrame<'_>) -> Measurement {
        self.channels.demultiplex(frame);
        self.stats.record_frame();

        let measurement = self.estimator.measure(&self.channels, self.mode, self.sequence);
        self.sequence += 1;

        if measurement.is_out_of_range() {
            self.stats.record_out_of_range();
        }
        measurement
    }

    /// Consume frames until the capture side disconnects or `running` is
    /// cleared
    pub fn run(
        &mut self,
        receiver: &FrameReceiver,
        running: &AtomicBool,
        presenter: &mut dyn Presenter,
    ) -> Result<()> {
        info!(
            "Measurement session started ({} mode, {} channels)",
            self.mode.as_str(),
            self.channels.channel_count()
        );

        let mut last_report = Instant::now();

        while running.load(Ordering::SeqCst) {
            match receiver.recv() {
                Ok(frame) => {
                    let measurement = self.process_frame(frame);
                    presenter.present(&measurement, &self.channels);
                }
                Err(ConsumeError::Timeout(waited)) => {
                    self.stats.record_timeout();
                    warn!("No frame within {:?}", waited);
                }
                Err(ConsumeError::Disconnected) => {
                    info!("Capture stopped, ending session");
                    break;
                }
            }

            if last_report.elapsed() >= self.report_interval {
                self.log_summary();
                last_report = Instant::now();
            }
        }

        info!(
            "Session stopped. Frames: {}, Out of range: {}, Timeouts: {}",
            self.stats.get_frames(),
            self.stats.get_out_of_range(),
            self.stats.get_timeouts()
        );

        Ok(())
    }

    fn log_summary(&self) {
        info!(
            "[Stats] Frames: {} | Out of range: {} | Timeouts: {}",
            self.stats.get_frames(),
            self.stats.get_out_of_range(),
            self.stats.get_timeouts()
        );
        if let Some(capture) = &self.capture_stats {
            info!("[Capture] {}", capture.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{CaptureConfig, CaptureController, FrameWait, SyntheticSource};
    use crate::estimator::{Bearing, Direction};
    use chrono::Utc;

    fn measurement(distance: Reading) -> Measurement {
        Measurement {
            sequence: 3,
            timestamp: Utc::now(),
            mode: MeasurementMode::Wire,
            distance_quick: distance,
            distance_accurate: distance,
            current_quick: Reading::Value(1200),
            current_accurate: Reading::Value(5000),
            bearing: Some(Bearing {
                angle: -12,
                direction: Direction::Right,
            }),
        }
    }

    #[test]
    fn test_describe_in_range() {
        let line = describe(&measurement(Reading::Value(42)));
        assert_eq!(
            line,
            "#3 wire | distance 42 mm (quick 42 mm) | angle -12° right | current 5000 mA (quick 1200 mA)"
        );
    }

    #[test]
    fn test_describe_hides_current_when_out_of_range() {
        let line = describe(&measurement(Reading::OutOfRange));
        assert!(line.contains("OUT OF RANGE"));
        assert!(!line.contains("mA"));
    }

    #[test]
    fn test_describe_missing_bearing() {
        let m = Measurement {
            bearing: None,
            ..measurement(Reading::Value(42))
        };
        assert!(describe(&m).contains("angle OUT OF RANGE |"));
    }

    #[test]
    fn test_log_presenter_counts() {
        let layout = ChannelLayout::default();
        let mut presenter = LogPresenter::new();
        presenter.present(&measurement(Reading::Value(42)), &ChannelSet::new(&layout));
        presenter.present(&measurement(Reading::OutOfRange), &ChannelSet::new(&layout));
        assert_eq!(presenter.shown(), 2);
    }

    #[derive(Default)]
    struct Collect(Vec<Measurement>);

    impl Presenter for Collect {
        fn present(&mut self, measurement: &Measurement, channels: &ChannelSet) {
            assert_eq!(channels.channel_count(), 4);
            self.0.push(measurement.clone());
        }
    }

    #[test]
    fn test_session_runs_until_capture_ends() {
        let config = CaptureConfig {
            layout: ChannelLayout::default(),
            trigger_rate_hz: 0,
            frame_wait: FrameWait::Timeout(Duration::from_secs(5)),
            max_frames: 4,
            ..CaptureConfig::default()
        };
        let controller = CaptureController::new(config.clone());
        let receiver = controller
            .start(SyntheticSource::pads_and_coils(600, 600, 0))
            .unwrap();

        let mut session =
            MeasurementSession::new(Estimator::default(), MeasurementMode::Wire, &config.layout);
        let running = AtomicBool::new(true);
        let mut presenter = Collect::default();
        session.run(&receiver, &running, &mut presenter).unwrap();

        assert_eq!(presenter.0.len(), 4);
        let sequences: Vec<u64> = presenter.0.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        for m in &presenter.0 {
            assert!(!m.is_out_of_range());
            assert_eq!(m.current_accurate, Reading::Value(1200));
        }
        assert_eq!(session.stats().get_frames(), 4);
    }

    #[test]
    fn test_session_stops_when_flag_cleared() {
        let layout = ChannelLayout::default();
        let (_publisher, receiver) =
            crate::acquisition::frame_channel(FrameWait::Timeout(Duration::from_millis(5)));
        let mut session = MeasurementSession::new(Estimator::default(), MeasurementMode::Wire, &layout);

        let running = AtomicBool::new(false);
        let mut presenter = LogPresenter::new();
        session.run(&receiver, &running, &mut presenter).unwrap();
        assert_eq!(presenter.shown(), 0);
        assert_eq!(session.stats().get_frames(), 0);
    }
}
