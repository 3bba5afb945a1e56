use super::FrameSource;
use crate::error::{Result, SourceError};
use crate::frame::FrameData;
use image::ImageFormat;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Frame source reading still images from a directory in file-name order
pub struct ImageSequenceSource {
    directory: PathBuf,
    pending: VecDeque<PathBuf>,
    next_index: u64,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let location = directory.to_string_lossy().to_string();

        let entries = fs::read_dir(&directory)
            .map_err(|e| SourceError::unavailable(location.clone(), e.to_string()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && ImageFormat::from_path(path).is_ok())
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(
                SourceError::unavailable(location, "directory contains no image files").into(),
            );
        }

        info!("Found {} frames in {}", files.len(), location);

        Ok(Self {
            directory,
            pending: files.into(),
            next_index: 0,
        })
    }

    /// Frames not yet pulled
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<FrameData>> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };

        let index = self.next_index;
        self.next_index += 1;

        debug!("Decoding frame {} from {}", index, path.display());

        let image = image::open(&path).map_err(|e| {
            SourceError::malformed(index, format!("{}: {}", path.display(), e))
        })?;

        Ok(Some(FrameData::from_rgb(index, image.to_rgb8())))
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.directory.display())
    }

    fn close(&mut self) {
        self.pending.clear();
    }
}
