use super::FrameSource;
use crate::error::Result;
use crate::frame::FrameData;
use std::collections::VecDeque;

/// Frame source over frames already held in memory
pub struct MemorySource {
    frames: VecDeque<FrameData>,
    total: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<FrameData>) -> Self {
        let total = frames.len();
        Self {
            frames: frames.into(),
            total,
        }
    }

    /// Frames not yet pulled
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<FrameData>> {
        Ok(self.frames.pop_front())
    }

    fn describe(&self) -> String {
        format!("memory ({} frames)", self.total)
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}
