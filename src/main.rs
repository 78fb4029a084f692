//! Cable locator - host runner
//!
//! Drives the capture pipeline from the synthetic front end and logs every
//! measurement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cable_locator::acquisition::CaptureController;
use cable_locator::demux::ChannelSet;
use cable_locator::estimator::{Estimator, Measurement};
use cable_locator::session::{LogPresenter, MeasurementSession, Presenter};
use cable_locator::Config;

/// Forwards measurements from the blocking session to the async logger
struct ChannelPresenter {
    tx: mpsc::Sender<(Measurement, ChannelSet)>,
}

impl Presenter for ChannelPresenter {
    fn present(&mut self, measurement: &Measurement, channels: &ChannelSet) {
        if let Err(e) = self.tx.blocking_send((measurement.clone(), channels.clone())) {
            debug!("Presenter gone, dropping measurement: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cable_locator=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("===========================================");
    info!("   Cable Locator - ADC Capture");
    info!("   RMS distance / angle / current");
    info!("===========================================");

    // Load configuration
    let config = Config::from_env();

    info!("Configuration:");
    info!("  Mode: {}", config.measurement_mode.as_str());
    info!("  Variant: {}", config.capture_variant.as_str());
    info!(
        "  Frame: {} x {} at {} bits",
        config.channel_count, config.samples_per_channel, config.resolution_bits
    );
    info!("  Trigger rate: {} Hz", config.trigger_rate_hz);
    info!("  Frame wait: {:?}", config.frame_wait());
    info!("  Synthetic waveform: {}", config.synth_waveform.as_str());
    if config.max_frames > 0 {
        info!("  Max frames: {}", config.max_frames);
    }

    let calibration = config.calibration()?;
    let capture_config = config.capture_config()?;
    let layout = capture_config.layout;

    let controller = Arc::new(CaptureController::new(capture_config));
    let receiver = match controller.start(config.synthetic_source()) {
        Ok(rx) => rx,
        Err(e) => {
            error!("Failed to start capture: {:#}", e);
            return Err(e);
        }
    };

    // Presentation runs on the async side
    let (measurement_tx, mut measurement_rx) = mpsc::channel::<(Measurement, ChannelSet)>(64);
    let presenter_handle = tokio::spawn(async move {
        let mut presenter = LogPresenter::new();
        while let Some((measurement, channels)) = measurement_rx.recv().await {
            presenter.present(&measurement, &channels);
        }
        presenter.shown()
    });

    info!("===========================================");
    info!("  Measuring...");
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let running = Arc::new(AtomicBool::new(true));
    let session_running = running.clone();
    let capture_stats = controller.stats().clone();
    let mode = config.measurement_mode;
    let report_interval = config.report_interval();

    let mut session_handle = tokio::task::spawn_blocking(move || {
        let mut session = MeasurementSession::new(Estimator::new(calibration), mode, &layout)
            .with_report_interval(report_interval)
            .with_capture_stats(capture_stats);
        let mut presenter = ChannelPresenter { tx: measurement_tx };
        session.run(&receiver, &session_running, &mut presenter)
    });

    let session_result = tokio::select! {
        result = &mut session_handle => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down...");
            running.store(false, Ordering::SeqCst);

            // Ending the capture thread disconnects a blocked session
            let stopper = controller.clone();
            tokio::task::spawn_blocking(move || stopper.stop()).await?;
            session_handle.await
        }
    };

    match session_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Session error: {:#}", e),
        Err(e) => error!("Session task failed: {}", e),
    }

    // Cleanup
    controller.stop();
    let shown = presenter_handle.await.unwrap_or(0);

    info!("Shutdown complete. Measurements shown: {}", shown);
    info!("Capture: {}", controller.stats().snapshot());
    Ok(())
}
