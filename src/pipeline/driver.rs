use super::report::{EndReason, SessionReport, SessionStats};
use crate::analyzer::{BackgroundSubtractor, Blob, BlobDetector, ForegroundExtractor};
use crate::config::CarcountConfig;
use crate::counter::{CountingBand, CrossingCounter};
use crate::error::{CounterError, Result, SessionError, SourceError};
use crate::frame::FrameData;
use crate::overlay::OverlayRenderer;
use crate::source::{open_source, FrameSource};

use image::RgbImage;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Cloneable request to end a running session at the next frame boundary
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.token.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// One processed frame as handed to the presentation layer
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub frame_index: u64,
    /// Copy of the input frame with the overlay drawn on it
    pub image: RgbImage,
    /// Counter value after this frame
    pub count: u64,
    pub blobs: Vec<Blob>,
    /// Crossings registered while processing this frame
    pub crossings: u32,
}

impl FrameOutput {
    pub fn counted(&self) -> bool {
        self.crossings > 0
    }
}

/// Result of advancing a session by one step
#[derive(Debug)]
pub enum StepOutcome {
    Frame(FrameOutput),
    /// The session is over and the driver is Idle again
    Finished(SessionReport),
}

enum Advance {
    Frame(FrameOutput),
    Ended(EndReason),
}

/// Everything owned by one counting session. Created by `start_session`,
/// dropped when the session ends.
pub struct PipelineState {
    source: Box<dyn FrameSource>,
    extractor: ForegroundExtractor,
    detector: BlobDetector,
    counter: CrossingCounter,
    overlay: OverlayRenderer,
    stats: SessionStats,
    frame_dimensions: Option<(u32, u32)>,
    consecutive_failures: u32,
    max_consecutive_failures: u32,
}

impl PipelineState {
    fn new(
        source: Box<dyn FrameSource>,
        config: &CarcountConfig,
        extractor: ForegroundExtractor,
    ) -> Self {
        let band = CountingBand::from(&config.line);
        let stats = SessionStats::new(source.describe());
        Self {
            source,
            extractor,
            detector: BlobDetector::new(&config.blob),
            counter: CrossingCounter::new(band, config.session.working_set_capacity),
            overlay: OverlayRenderer::new(&config.overlay, band),
            stats,
            frame_dimensions: None,
            consecutive_failures: 0,
            max_consecutive_failures: config.source.max_consecutive_failures,
        }
    }

    pub fn count(&self) -> u64 {
        self.counter.count()
    }

    fn advance(&mut self) -> Result<Advance> {
        loop {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(Advance::Ended(EndReason::EndOfStream)),
                Err(e) if e.is_recoverable() => {
                    if self.skip_frame(&e) {
                        return Ok(Advance::Ended(EndReason::DecodeFailures));
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Err(e) = self.check_frame(&frame) {
                if self.skip_frame(&e) {
                    return Ok(Advance::Ended(EndReason::DecodeFailures));
                }
                continue;
            }

            self.consecutive_failures = 0;
            return self.process(frame).map(Advance::Frame);
        }
    }

    /// Record a skipped frame; true once the failure limit is reached
    fn skip_frame(&mut self, err: &CounterError) -> bool {
        self.stats.frames_skipped += 1;
        self.consecutive_failures += 1;
        warn!("Skipping frame: {}", err);

        let exhausted = self.max_consecutive_failures > 0
            && self.consecutive_failures >= self.max_consecutive_failures;
        if exhausted {
            warn!(
                "{} consecutive frames failed, treating source as ended",
                self.consecutive_failures
            );
        }
        exhausted
    }

    fn check_frame(&mut self, frame: &FrameData) -> Result<()> {
        frame.validate()?;

        match self.frame_dimensions {
            Some(expected) if expected != frame.dimensions() => Err(SourceError::malformed(
                frame.index,
                format!(
                    "frame is {}x{}, stream is {}x{}",
                    frame.width, frame.height, expected.0, expected.1
                ),
            )
            .into()),
            Some(_) => Ok(()),
            None => {
                self.frame_dimensions = Some(frame.dimensions());
                Ok(())
            }
        }
    }

    fn process(&mut self, frame: FrameData) -> Result<FrameOutput> {
        let mask = self.extractor.apply(&frame)?;

        let mut blobs = Vec::new();
        let mut crossings = 0;
        for blob in self.detector.extract(&mask) {
            if self.counter.observe(blob.centroid) {
                crossings += 1;
            }
            blobs.push(blob);
        }

        let count = self.counter.count();
        let mut image = frame.to_rgb_image()?;
        self.overlay.annotate(&mut image, &blobs, count);

        self.stats.frames_processed += 1;
        self.stats.blobs_observed += blobs.len() as u64;

        debug!(
            "Frame {}: {} blobs, {} crossings, count {}",
            frame.index,
            blobs.len(),
            crossings,
            count
        );

        Ok(FrameOutput {
            frame_index: frame.index,
            image,
            count,
            blobs,
            crossings,
        })
    }

    fn finish(mut self, reason: EndReason) -> SessionReport {
        self.source.close();
        let count = self.counter.count();
        info!(
            "Session {} ended ({:?}): {} vehicles over {} frames",
            self.stats.session_id, reason, count, self.stats.frames_processed
        );
        self.stats.into_report(count, reason)
    }
}

enum DriverState {
    Idle,
    Running(Box<PipelineState>),
}

/// Advances counting sessions frame by frame. Idle until `start_session`,
/// back to Idle at end of stream, on stop, or on a fatal error.
pub struct PipelineDriver {
    state: DriverState,
    stop: StopHandle,
}

impl Default for PipelineDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineDriver {
    pub fn new() -> Self {
        Self {
            state: DriverState::Idle,
            stop: StopHandle::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, DriverState::Running(_))
    }

    /// Current count of the running session
    pub fn count(&self) -> Option<u64> {
        match &self.state {
            DriverState::Running(state) => Some(state.count()),
            DriverState::Idle => None,
        }
    }

    /// Stop handle for the current session. Take it after `start_session`;
    /// each session gets a fresh handle.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Open the source at `path` and start a session on it
    pub fn start_session_from_path<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &CarcountConfig,
    ) -> Result<()> {
        self.ensure_idle()?;
        let source = open_source(path)?;
        self.start_session(source, config)
    }

    /// Start a session with the background model selected by `config`
    pub fn start_session(
        &mut self,
        source: Box<dyn FrameSource>,
        config: &CarcountConfig,
    ) -> Result<()> {
        self.ensure_idle()?;
        let extractor = ForegroundExtractor::new(&config.foreground, &config.background);
        self.begin(source, config, extractor);
        Ok(())
    }

    /// Start a session around a caller-supplied background model
    pub fn start_session_with_subtractor(
        &mut self,
        source: Box<dyn FrameSource>,
        config: &CarcountConfig,
        subtractor: Box<dyn BackgroundSubtractor>,
    ) -> Result<()> {
        self.ensure_idle()?;
        let extractor = ForegroundExtractor::with_subtractor(&config.foreground, subtractor);
        self.begin(source, config, extractor);
        Ok(())
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_running() {
            warn!("Rejecting session start: a session is already running");
            return Err(SessionError::AlreadyRunning.into());
        }
        Ok(())
    }

    fn begin(
        &mut self,
        source: Box<dyn FrameSource>,
        config: &CarcountConfig,
        extractor: ForegroundExtractor,
    ) {
        let state = PipelineState::new(source, config, extractor);
        info!(
            "Session {} started on {} (count line {}, offset {})",
            state.stats.session_id, state.stats.source, config.line.count_line, config.line.offset
        );
        self.stop = StopHandle::new();
        self.state = DriverState::Running(Box::new(state));
    }

    /// Pull and process the next frame
    pub fn step(&mut self) -> Result<StepOutcome> {
        if !self.is_running() {
            return Err(SessionError::NotRunning.into());
        }

        if self.stop.is_stop_requested() {
            info!("Stop requested, ending session");
            return self.end(EndReason::Stopped).map(StepOutcome::Finished);
        }

        let advance = match &mut self.state {
            DriverState::Running(state) => state.advance(),
            DriverState::Idle => return Err(SessionError::NotRunning.into()),
        };

        match advance {
            Ok(Advance::Frame(output)) => Ok(StepOutcome::Frame(output)),
            Ok(Advance::Ended(reason)) => self.end(reason).map(StepOutcome::Finished),
            Err(e) => {
                error!("Session failed: {}", e);
                self.end(EndReason::Failed(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// End the running session immediately
    pub fn stop(&mut self) -> Result<SessionReport> {
        self.end(EndReason::Stopped)
    }

    fn end(&mut self, reason: EndReason) -> Result<SessionReport> {
        match std::mem::replace(&mut self.state, DriverState::Idle) {
            DriverState::Running(state) => Ok(state.finish(reason)),
            DriverState::Idle => Err(SessionError::NotRunning.into()),
        }
    }
}
