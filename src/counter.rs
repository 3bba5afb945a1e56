use crate::analyzer::Centroid;
use crate::config::LineConfig;

use std::collections::VecDeque;
use tracing::{debug, info};

/// Horizontal counting band: rows strictly within `offset` of `count_line`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountingBand {
    count_line: u32,
    offset: u32,
}

impl CountingBand {
    pub fn new(count_line: u32, offset: u32) -> Self {
        Self { count_line, offset }
    }

    pub fn count_line(&self) -> u32 {
        self.count_line
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Whether `y` lies strictly between `count_line - offset` and `count_line + offset`
    pub fn contains(&self, y: u32) -> bool {
        let (y, line, offset) = (i64::from(y), i64::from(self.count_line), i64::from(self.offset));
        line - offset < y && y < line + offset
    }
}

impl From<&LineConfig> for CountingBand {
    fn from(config: &LineConfig) -> Self {
        Self::new(config.count_line, config.offset)
    }
}

/// Counts centroids that reach the counting band.
///
/// Every observed centroid joins a working set; the first entry found inside
/// the band is consumed and bumps the count. Because a centroid inside the
/// band is consumed on the call that adds it, the working set never holds an
/// in-band entry between calls, so evicting old entries at capacity cannot
/// change the count.
#[derive(Debug, Clone)]
pub struct CrossingCounter {
    band: CountingBand,
    working_set: VecDeque<Centroid>,
    capacity: usize,
    count: u64,
}

impl CrossingCounter {
    /// `capacity` bounds the working set; 0 leaves it unbounded
    pub fn new(band: CountingBand, capacity: usize) -> Self {
        Self {
            band,
            working_set: VecDeque::new(),
            capacity,
            count: 0,
        }
    }

    /// Record a centroid, returning whether it produced a crossing
    pub fn observe(&mut self, centroid: Centroid) -> bool {
        if self.capacity > 0 && self.working_set.len() >= self.capacity {
            self.working_set.pop_front();
        }
        self.working_set.push_back(centroid);

        let band = self.band;
        let Some(index) = self.working_set.iter().position(|c| band.contains(c.y)) else {
            return false;
        };

        if let Some(consumed) = self.working_set.remove(index) {
            debug!("Consumed centroid ({}, {})", consumed.x, consumed.y);
        }
        self.count += 1;
        info!("Vehicle reached counting line, count now {}", self.count);
        true
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn band(&self) -> CountingBand {
        self.band
    }

    pub fn working_set_len(&self) -> usize {
        self.working_set.len()
    }

    /// Clear the count and forget every remembered centroid
    pub fn reset(&mut self) {
        self.working_set.clear();
        self.count = 0;
    }
}
