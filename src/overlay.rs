use crate::analyzer::Blob;
use crate::config::OverlayConfig;
use crate::counter::CountingBand;
use crate::error::{CounterError, Result};

use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const LINE_COLOR: Rgb<u8> = Rgb([250, 0, 0]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CENTROID_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 120]);

/// Baseline-left origin of the counter label
const TEXT_ORIGIN: (i32, i32) = (450, 70);

/// Load a TrueType font from disk
pub fn load_font<P: AsRef<Path>>(path: P) -> Result<Font<'static>> {
    let path = path.as_ref();
    let font_data = fs::read(path)?;
    Font::try_from_vec(font_data).ok_or_else(|| {
        CounterError::system(format!("Failed to parse font file '{}'", path.display()))
    })
}

/// Draws the counting band, blob boxes, centroids and the running count
pub struct OverlayRenderer {
    config: OverlayConfig,
    band: CountingBand,
    font: Option<Font<'static>>,
}

impl OverlayRenderer {
    pub fn new(config: &OverlayConfig, band: CountingBand) -> Self {
        let font = if config.enabled {
            match load_font(&config.font_path) {
                Ok(font) => Some(font),
                Err(e) => {
                    warn!(
                        "Counter text disabled, font '{}' unavailable: {}",
                        config.font_path, e
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            config: config.clone(),
            band,
            font,
        }
    }

    /// Whether the count label will be drawn
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, canvas: &mut RgbImage, blobs: &[Blob], count: u64) {
        if !self.config.enabled {
            return;
        }

        self.draw_count_line(canvas);
        for blob in blobs {
            self.draw_blob(canvas, blob);
        }
        self.draw_count_text(canvas, count);
    }

    fn draw_count_line(&self, canvas: &mut RgbImage) {
        let thickness = self.config.line_thickness.max(1) as i64;
        let width = canvas.width() as f32;
        let line = i64::from(self.band.count_line());

        for i in 0..thickness {
            let y = (line + i - thickness / 2) as f32;
            draw_line_segment_mut(canvas, (0.0, y), (width, y), LINE_COLOR);
        }
    }

    fn draw_blob(&self, canvas: &mut RgbImage, blob: &Blob) {
        let bbox = blob.bounding_box;
        for i in 0..self.config.box_thickness.max(1) {
            let (Some(width), Some(height)) = (
                bbox.width.checked_sub(2 * i).filter(|w| *w > 0),
                bbox.height.checked_sub(2 * i).filter(|h| *h > 0),
            ) else {
                break;
            };
            let rect = Rect::at((bbox.x + i) as i32, (bbox.y + i) as i32).of_size(width, height);
            draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
        }

        draw_filled_circle_mut(
            canvas,
            (blob.centroid.x as i32, blob.centroid.y as i32),
            self.config.centroid_radius as i32,
            CENTROID_COLOR,
        );
    }

    fn draw_count_text(&self, canvas: &mut RgbImage, count: u64) {
        let Some(font) = &self.font else {
            return;
        };

        let text = format!("{}: {}", self.config.label, count);
        let scale = Scale::uniform(self.config.font_size);
        let (_, text_height) = text_size(scale, font, &text);
        let (x, baseline) = TEXT_ORIGIN;

        draw_text_mut(
            canvas,
            TEXT_COLOR,
            x,
            baseline - text_height,
            scale,
            font,
            &text,
        );
        debug!("Drew counter label '{}'", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{BoundingBox, Centroid};

    fn renderer(config: OverlayConfig) -> OverlayRenderer {
        OverlayRenderer::new(&config, CountingBand::new(50, 6))
    }

    fn no_font() -> OverlayConfig {
        OverlayConfig {
            font_path: "/nonexistent/font.ttf".to_string(),
            ..OverlayConfig::default()
        }
    }

    fn blob() -> Blob {
        let bounding_box = BoundingBox {
            x: 10,
            y: 20,
            width: 40,
            height: 30,
        };
        Blob {
            bounding_box,
            centroid: bounding_box.centroid(),
            hole: false,
        }
    }

    #[test]
    fn test_missing_font_still_draws_shapes() {
        let overlay = renderer(no_font());
        assert!(!overlay.has_font());

        let mut canvas = RgbImage::new(100, 100);
        overlay.annotate(&mut canvas, &[blob()], 3);

        assert_eq!(*canvas.get_pixel(0, 50), LINE_COLOR);
        assert_eq!(*canvas.get_pixel(99, 49), LINE_COLOR);
        assert_eq!(*canvas.get_pixel(99, 51), LINE_COLOR);
        assert_eq!(*canvas.get_pixel(10, 20), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(11, 21), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(30, 35), CENTROID_COLOR);
        assert_eq!(*canvas.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_disabled_overlay_leaves_frame_untouched() {
        let overlay = renderer(OverlayConfig {
            enabled: false,
            ..no_font()
        });
        let mut canvas = RgbImage::from_pixel(64, 64, Rgb([7, 7, 7]));
        overlay.annotate(&mut canvas, &[blob()], 1);
        assert!(canvas.pixels().all(|p| *p == Rgb([7, 7, 7])));
    }

    #[test]
    fn test_line_outside_frame_is_clipped() {
        let overlay = OverlayRenderer::new(&no_font(), CountingBand::new(550, 6));
        let mut canvas = RgbImage::new(32, 32);
        overlay.annotate(
            &mut canvas,
            &[Blob {
                bounding_box: BoundingBox {
                    x: 28,
                    y: 28,
                    width: 10,
                    height: 10,
                },
                centroid: Centroid::new(33, 33),
                hole: false,
            }],
            0,
        );
        assert_eq!(*canvas.get_pixel(28, 28), BOX_COLOR);
    }

    #[test]
    fn test_load_font_reports_missing_file() {
        assert!(matches!(
            load_font("/nonexistent/font.ttf"),
            Err(CounterError::Io(_))
        ));
    }
}
