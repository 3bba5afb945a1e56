use super::knn::KnnBackgroundModel;
use crate::config::{BackgroundAlgorithm, BackgroundConfig};
use crate::error::{AnalyzerError, Result};

use image::{GrayImage, Luma};
use imageproc::contrast::threshold;
use tracing::{debug, info};

/// Per-pixel background model that turns intensity frames into foreground masks.
///
/// Every call to `apply` both classifies the frame and folds it into the
/// model, so frames must be fed exactly once and in stream order.
pub trait BackgroundSubtractor: Send {
    /// Classify `frame` against the model and update the model with it.
    /// Mask pixels are 0 for background and non-zero for foreground.
    fn apply(&mut self, frame: &GrayImage) -> Result<GrayImage>;

    /// Forget everything learned so far
    fn reset(&mut self);

    /// Number of frames folded into the model since the last reset
    fn frames_seen(&self) -> u64;
}

/// Build the background model selected by configuration
pub fn build_subtractor(config: &BackgroundConfig) -> Box<dyn BackgroundSubtractor> {
    match config.algorithm {
        BackgroundAlgorithm::Knn => Box::new(KnnBackgroundModel::new(config)),
        BackgroundAlgorithm::RunningAverage => Box::new(RunningAverageModel::new(
            config.delta_threshold,
            config.learning_rate.unwrap_or(0.05) as f32,
        )),
    }
}

pub(crate) fn check_dimensions(model: (u32, u32), frame: &GrayImage) -> Result<()> {
    let (actual_width, actual_height) = frame.dimensions();
    if model != (actual_width, actual_height) {
        return Err(AnalyzerError::DimensionMismatch {
            model_width: model.0,
            model_height: model.1,
            actual_width,
            actual_height,
        }
        .into());
    }
    Ok(())
}

/// Running-average background with an absolute difference threshold
pub struct RunningAverageModel {
    delta_threshold: u8,
    learning_rate: f32,
    background: Option<GrayImage>,
    frames_seen: u64,
}

impl RunningAverageModel {
    pub fn new(delta_threshold: u8, learning_rate: f32) -> Self {
        Self {
            delta_threshold,
            learning_rate,
            background: None,
            frames_seen: 0,
        }
    }

    pub fn background(&self) -> Option<&GrayImage> {
        self.background.as_ref()
    }
}

impl BackgroundSubtractor for RunningAverageModel {
    fn apply(&mut self, frame: &GrayImage) -> Result<GrayImage> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(AnalyzerError::FrameProcessing {
                details: "empty frame".to_string(),
            }
            .into());
        }

        let Some(background) = self.background.as_mut() else {
            info!("Initializing running average background with first frame");
            self.background = Some(frame.clone());
            self.frames_seen = 1;
            return Ok(GrayImage::new(width, height));
        };

        check_dimensions(background.dimensions(), frame)?;

        let mut diff_image = GrayImage::new(width, height);
        for ((diff, bg_pixel), curr_pixel) in diff_image
            .pixels_mut()
            .zip(background.pixels())
            .zip(frame.pixels())
        {
            *diff = Luma([bg_pixel[0].abs_diff(curr_pixel[0])]);
        }

        let mask = threshold(&diff_image, self.delta_threshold);

        let rate = self.learning_rate;
        for (bg_pixel, curr_pixel) in background.pixels_mut().zip(frame.pixels()) {
            let bg_val = bg_pixel[0] as f32;
            let curr_val = curr_pixel[0] as f32;
            bg_pixel[0] = (bg_val * (1.0 - rate) + curr_val * rate) as u8;
        }

        self.frames_seen += 1;
        debug!("Running average updated ({} frames)", self.frames_seen);

        Ok(mask)
    }

    fn reset(&mut self) {
        self.background = None;
        self.frames_seen = 0;
    }

    fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}
