use crate::error::{Result, SourceError};
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Pixel layout of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Packed 8-bit RGB
    Rgb24,
    /// Single 8-bit intensity channel
    Gray8,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Rgb24 => 3,
            FrameFormat::Gray8 => 1,
        }
    }
}

/// A decoded frame as handed out by a frame source
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Position of the frame in its stream, starting at 0
    pub index: u64,
    /// Time the frame was produced by its source
    pub timestamp: SystemTime,
    /// Raw pixel bytes, row-major
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(index: u64, data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            index,
            timestamp: SystemTime::now(),
            data,
            width,
            height,
            format,
        }
    }

    /// Wrap an RGB image without copying its buffer
    pub fn from_rgb(index: u64, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(index, image.into_raw(), width, height, FrameFormat::Rgb24)
    }

    /// Wrap a grayscale image without copying its buffer
    pub fn from_gray(index: u64, image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(index, image.into_raw(), width, height, FrameFormat::Gray8)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the expected buffer size for the frame's dimensions and format
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Check the frame is non-empty and its buffer matches its declared size
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SourceError::malformed(
                self.index,
                format!("empty frame ({}x{})", self.width, self.height),
            )
            .into());
        }

        if self.data.len() != self.expected_size() {
            return Err(SourceError::malformed(
                self.index,
                format!(
                    "buffer holds {} bytes, expected {} for {}x{} {:?}",
                    self.data.len(),
                    self.expected_size(),
                    self.width,
                    self.height,
                    self.format
                ),
            )
            .into());
        }

        Ok(())
    }

    /// Copy the frame into an RGB image, expanding grayscale if needed
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        self.validate()?;

        let image = match self.format {
            FrameFormat::Rgb24 => RgbImage::from_raw(self.width, self.height, self.data.clone()),
            FrameFormat::Gray8 => {
                let rgb = self.data.iter().flat_map(|&v| [v, v, v]).collect();
                RgbImage::from_raw(self.width, self.height, rgb)
            }
        };

        image.ok_or_else(|| {
            SourceError::malformed(self.index, "failed to create RGB image from raw data").into()
        })
    }

    /// Convert to a single intensity channel using ITU-R BT.601 luma weights
    pub fn to_gray_image(&self) -> Result<GrayImage> {
        self.validate()?;

        match self.format {
            FrameFormat::Gray8 => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .ok_or_else(|| {
                    SourceError::malformed(self.index, "failed to create gray image from raw data")
                        .into()
                }),
            FrameFormat::Rgb24 => {
                let mut gray_image = GrayImage::new(self.width, self.height);
                for (pixel, rgb) in gray_image.pixels_mut().zip(self.data.chunks_exact(3)) {
                    let gray_value =
                        0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32;
                    *pixel = Luma([gray_value.round().min(255.0) as u8]);
                }
                Ok(gray_image)
            }
        }
    }
}
