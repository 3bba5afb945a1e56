use super::background::{build_subtractor, BackgroundSubtractor};
use super::morphology::{self, StructuringElement};
use crate::config::{BackgroundConfig, ForegroundConfig};
use crate::error::Result;
use crate::frame::FrameData;

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::dilate;
use tracing::{debug, info};

/// Normalised 1-D Gaussian weights for a `size`-tap kernel
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let half = (size / 2) as i32;
    let weights: Vec<f32> = (-half..=half)
        .map(|x| (-((x * x) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Turns raw frames into cleaned binary foreground masks: grayscale,
/// Gaussian blur, background subtraction, dilation, then closing.
pub struct ForegroundExtractor {
    blur_kernel: Vec<f32>,
    dilate_radius: u8,
    close_element: StructuringElement,
    close_iterations: u32,
    subtractor: Box<dyn BackgroundSubtractor>,
}

impl ForegroundExtractor {
    pub fn new(foreground: &ForegroundConfig, background: &BackgroundConfig) -> Self {
        info!(
            "Foreground extractor using {:?} background model",
            background.algorithm
        );
        Self::with_subtractor(foreground, build_subtractor(background))
    }

    /// Build an extractor around an already constructed background model
    pub fn with_subtractor(
        config: &ForegroundConfig,
        subtractor: Box<dyn BackgroundSubtractor>,
    ) -> Self {
        Self {
            blur_kernel: gaussian_kernel(config.blur_kernel, config.blur_sigma),
            dilate_radius: (config.dilate_kernel / 2).min(u32::from(u8::MAX)) as u8,
            close_element: StructuringElement::ellipse(config.close_kernel, config.close_kernel),
            close_iterations: config.close_iterations,
            subtractor,
        }
    }

    /// Produce the foreground mask for `frame`, updating the background model.
    ///
    /// The blur clamps at the image edge rather than reflecting; with the
    /// default 3-tap kernel the two differ by less than one grey level.
    pub fn apply(&mut self, frame: &FrameData) -> Result<GrayImage> {
        let gray = frame.to_gray_image()?;
        let blurred = separable_filter_equal(&gray, self.blur_kernel.as_slice());

        let raw = self.subtractor.apply(&blurred)?;

        // Square element: every pixel within Chebyshev distance of the radius
        let dilated = dilate(&raw, Norm::LInf, self.dilate_radius);
        let closed = morphology::close(&dilated, &self.close_element, self.close_iterations);

        debug!(
            "Frame {} foreground: {} pixels",
            frame.index,
            closed.pixels().filter(|p| p[0] != 0).count()
        );

        Ok(closed)
    }

    pub fn frames_seen(&self) -> u64 {
        self.subtractor.frames_seen()
    }

    pub fn reset(&mut self) {
        self.subtractor.reset();
    }
}
