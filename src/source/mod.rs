mod memory;
mod sequence;
#[cfg(all(feature = "video", target_os = "linux"))]
mod video;
#[cfg(test)]
mod tests;

pub use memory::MemorySource;
pub use sequence::ImageSequenceSource;
#[cfg(all(feature = "video", target_os = "linux"))]
pub use video::GstVideoSource;

use crate::error::{Result, SourceError};
use crate::frame::FrameData;
use std::path::Path;
use tracing::info;

/// Sequential supplier of raw frames for a counting session
pub trait FrameSource: Send {
    /// Pull the next frame.
    ///
    /// `Ok(None)` signals end of stream. A `SourceError::MalformedFrame` error
    /// only affects the current frame; the caller may keep pulling.
    fn next_frame(&mut self) -> Result<Option<FrameData>>;

    /// Human-readable description used in logs and session reports
    fn describe(&self) -> String;

    /// Release underlying resources. Further pulls return end of stream.
    fn close(&mut self) {}
}

/// Open a frame source for a path: directories are read as image sequences,
/// files are decoded as video
pub fn open_source<P: AsRef<Path>>(path: P) -> Result<Box<dyn FrameSource>> {
    let path = path.as_ref();
    let location = path.to_string_lossy().to_string();

    if !path.exists() {
        return Err(SourceError::unavailable(location, "no such file or directory").into());
    }

    if path.is_dir() {
        info!("Opening image sequence source: {}", location);
        return Ok(Box::new(ImageSequenceSource::open(path)?));
    }

    open_video(path)
}

#[cfg(all(feature = "video", target_os = "linux"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    info!("Opening GStreamer video source: {}", path.display());
    Ok(Box::new(GstVideoSource::open(path)?))
}

#[cfg(not(all(feature = "video", target_os = "linux")))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    Err(SourceError::unavailable(
        path.to_string_lossy(),
        "video decoding requires the `video` feature on Linux; pass a directory of frames instead",
    )
    .into())
}
