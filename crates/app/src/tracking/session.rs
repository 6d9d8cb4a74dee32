//! The capture → detect → send → display loop and its teardown.

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result, bail};
use ml_core::HandDetector;
use tracing::{debug, info, warn};
use video_ingest::FrameSource;

use crate::tracking::{
    annotation,
    config::StreamConfig,
    display::{FrameSink, HeadlessSink, SinkControl},
    pipeline::{FpsMeter, FramePipeline},
    telemetry,
    transport::{ReportChannel, TransportListener},
};

/// Why the loop stopped without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    ExitKey,
    Interrupted,
    SourceClosed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_captured: u64,
    pub frames_skipped: u64,
    pub reports_sent: u64,
    pub bytes_sent: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOutcome {
    pub reason: ExitReason,
    pub stats: SessionStats,
}

/// Owns the camera, the preview sink and the client connection for one run.
pub(crate) struct Session<S, D, K, C> {
    source: S,
    pipeline: FramePipeline<D>,
    sink: K,
    channel: C,
    shutdown: Arc<AtomicBool>,
    fps: FpsMeter,
    stats: SessionStats,
}

impl<S, D, K, C> Session<S, D, K, C>
where
    S: FrameSource,
    D: HandDetector,
    K: FrameSink,
    C: ReportChannel,
{
    pub fn new(
        source: S,
        pipeline: FramePipeline<D>,
        sink: K,
        channel: C,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            pipeline,
            sink,
            channel,
            shutdown,
            fps: FpsMeter::default(),
            stats: SessionStats::default(),
        }
    }

    /// Run until the exit key, Ctrl+C, the camera closing, or an error.
    /// Resources are released before the result is returned.
    pub fn run(mut self) -> Result<SessionOutcome> {
        let result = self.drive();
        self.teardown();
        match &result {
            Ok(reason) => info!(
                "Session ended ({reason:?}): {} frame(s), {} report(s), {} byte(s) sent",
                self.stats.frames_captured, self.stats.reports_sent, self.stats.bytes_sent
            ),
            Err(err) => warn!(
                "Session failed after {} frame(s): {err:#}",
                self.stats.frames_captured
            ),
        }
        result.map(|reason| SessionOutcome {
            reason,
            stats: self.stats,
        })
    }

    fn drive(&mut self) -> Result<ExitReason> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(ExitReason::Interrupted);
            }
            if !self.source.is_open() {
                return Ok(ExitReason::SourceClosed);
            }

            let Some(mut frame) = self.source.read().context("camera read failed")? else {
                self.stats.frames_skipped += 1;
                metrics::counter!(telemetry::FRAMES_SKIPPED_TOTAL).increment(1);
                debug!(
                    "Ignoring empty camera frame ({} so far)",
                    self.stats.frames_skipped
                );
                continue;
            };

            self.stats.frames_captured += 1;
            let frame_number = self.stats.frames_captured;
            let _frame_span = tracing::info_span!(
                "frame",
                frame = frame_number,
                width = frame.width,
                height = frame.height
            )
            .entered();
            metrics::counter!(telemetry::FRAMES_TOTAL).increment(1);
            let fps = self.fps.tick();
            metrics::gauge!(telemetry::FPS).set(f64::from(fps));

            let processed = self.pipeline.process(&mut frame)?;
            metrics::gauge!(telemetry::HANDS_DETECTED).set(processed.hands as f64);

            if let Some(payload) = processed.payload {
                let written = self
                    .channel
                    .send(&payload)
                    .context("failed to send report to client")?;
                self.stats.reports_sent += 1;
                self.stats.bytes_sent += written as u64;
                metrics::counter!(telemetry::REPORTS_SENT_TOTAL).increment(1);
                metrics::counter!(telemetry::BYTES_SENT_TOTAL).increment(written as u64);
            }

            if frame_number % 30 == 0 {
                debug!("Capture heartbeat: frame #{frame_number}, {fps:.1} fps");
            }

            annotation::draw_hud(&mut frame, frame_number, fps, processed.hands)?;
            if self.sink.show(&frame).context("preview window failed")? == SinkControl::Exit {
                return Ok(ExitReason::ExitKey);
            }
        }
    }

    fn teardown(&mut self) {
        self.source.release();
        self.sink.close();
        self.channel.close();
        debug!("Released camera, preview and client connection");
    }
}

/// Size of the image fed to the TorchScript hand model.
#[cfg(feature = "with-tch")]
const DETECTOR_INPUT_SIZE: (i64, i64) = (224, 224);

/// Serve one client until the session ends.
pub fn run(config: StreamConfig) -> Result<SessionOutcome> {
    if let Some(addr) = config.metrics_addr {
        telemetry::install_prometheus(addr)?;
    }

    let session_span = tracing::info_span!(
        "hand_stream.session",
        listen = %config.listen_addr,
        device = %config.device,
        framing = config.framing.as_str(),
        handedness = ?config.handedness,
    );
    let _session_guard = session_span.enter();

    let detector = load_detector(&config)?;
    ensure_capture_support()?;

    let listener = TransportListener::bind(config.listen_addr)
        .context("failed to start the report server")?;
    info!("Waiting for a client on {}", listener.local_addr());
    let connection = listener.accept_one(config.framing)?;
    info!("Streaming reports to {}", connection.peer_addr());

    // Installed only once a client is connected so Ctrl+C still kills a
    // server that is blocked in accept.
    let shutdown = install_shutdown_handler();

    let source = open_capture(&config)?;
    let sink = open_sink(&config)?;
    let pipeline = FramePipeline::new(detector, config.handedness);
    Session::new(source, pipeline, sink, connection, shutdown).run()
}

fn install_shutdown_handler() -> Arc<AtomicBool> {
    static SHUTDOWN: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    SHUTDOWN
        .get_or_init(|| {
            let shutdown = Arc::new(AtomicBool::new(false));
            let handler_shutdown = shutdown.clone();
            if let Err(err) = ctrlc::set_handler(move || {
                handler_shutdown.store(true, Ordering::SeqCst);
            }) {
                warn!("Failed to install Ctrl+C handler: {err}");
            }
            shutdown
        })
        .clone()
}

#[cfg(feature = "with-tch")]
fn load_detector(config: &StreamConfig) -> Result<Box<dyn HandDetector>> {
    use ml_core::{
        detector::TorchHandDetector,
        tch::{Cuda, Device},
    };

    let Some(model_path) = config.model_path.as_ref() else {
        bail!("no hand model given; pass --model <PATH> to a TorchScript hand landmark model");
    };
    let device = Device::cuda_if_available();
    debug!(
        "CUDA available: {} (devices: {})",
        Cuda::is_available(),
        Cuda::device_count()
    );
    let detector =
        TorchHandDetector::new(model_path, device, DETECTOR_INPUT_SIZE, config.detector)
            .with_context(|| format!("failed to load hand model {}", model_path.display()))?;
    info!("Loaded hand model {} on {device:?}", model_path.display());
    Ok(Box::new(detector))
}

#[cfg(not(feature = "with-tch"))]
fn load_detector(_config: &StreamConfig) -> Result<Box<dyn HandDetector>> {
    bail!("hand-stream was built without the `with-tch` feature, so no hand model can be loaded")
}

#[cfg(feature = "with-opencv")]
fn ensure_capture_support() -> Result<()> {
    Ok(())
}

#[cfg(not(feature = "with-opencv"))]
const NO_CAPTURE_SUPPORT: &str =
    "hand-stream was built without the `with-opencv` feature, so no camera can be opened";

#[cfg(not(feature = "with-opencv"))]
fn ensure_capture_support() -> Result<()> {
    bail!(NO_CAPTURE_SUPPORT)
}

#[cfg(feature = "with-opencv")]
fn open_capture(config: &StreamConfig) -> Result<Box<dyn FrameSource>> {
    let camera = video_ingest::Camera::open(&config.device, video_ingest::CAPTURE_PRESET)
        .with_context(|| format!("failed to open camera {}", config.device))?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "with-opencv"))]
fn open_capture(_config: &StreamConfig) -> Result<Box<dyn FrameSource>> {
    bail!(NO_CAPTURE_SUPPORT)
}

#[cfg(feature = "with-opencv")]
fn open_sink(config: &StreamConfig) -> Result<Box<dyn FrameSink>> {
    if !config.display {
        return Ok(Box::new(HeadlessSink::default()));
    }
    let window = crate::tracking::display::HighguiWindow::open(
        crate::tracking::display::WINDOW_TITLE,
    )?;
    Ok(Box::new(window))
}

#[cfg(not(feature = "with-opencv"))]
fn open_sink(config: &StreamConfig) -> Result<Box<dyn FrameSink>> {
    if config.display {
        warn!("Preview window needs the `with-opencv` feature; running headless");
    }
    Ok(Box::new(HeadlessSink::default()))
}
