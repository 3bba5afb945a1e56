use crate::config::BlobConfig;

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Pixel position inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Centroid {
    pub x: u32,
    pub y: u32,
}

impl Centroid {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box; `width` and `height` count pixels inclusively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Centre of the box, rounded down
    pub fn centroid(&self) -> Centroid {
        Centroid::new(self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// A foreground region large enough to be a vehicle candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub bounding_box: BoundingBox,
    pub centroid: Centroid,
    /// Traced from the inner border of a hole rather than an outer border
    pub hole: bool,
}

/// Extracts candidate blobs from foreground masks by tracing region borders
#[derive(Debug, Clone, Copy)]
pub struct BlobDetector {
    min_width: u32,
    min_height: u32,
}

impl BlobDetector {
    pub fn new(config: &BlobConfig) -> Self {
        Self {
            min_width: config.min_width,
            min_height: config.min_height,
        }
    }

    /// Whether a box is at least the configured minimum in both dimensions
    pub fn accepts(&self, bounding_box: &BoundingBox) -> bool {
        bounding_box.width >= self.min_width && bounding_box.height >= self.min_height
    }

    /// Trace every border in `mask` (outer and hole borders, in raster order)
    /// and yield the ones that pass the size filter
    pub fn extract(&self, mask: &GrayImage) -> impl Iterator<Item = Blob> {
        let detector = *self;
        find_contours::<i32>(mask)
            .into_iter()
            .filter_map(move |contour| {
                let polygon = approximate_simple(&contour.points);
                let bounding_box = bounding_box(&polygon)?;
                if !detector.accepts(&bounding_box) {
                    trace!("Discarding {:?}", bounding_box);
                    return None;
                }
                Some(Blob {
                    bounding_box,
                    centroid: bounding_box.centroid(),
                    hole: matches!(contour.border_type, BorderType::Hole),
                })
            })
    }
}

/// Compress a closed chain to the points where its direction changes
pub(crate) fn approximate_simple(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let corners: Vec<Point<i32>> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let curr = points[i];
            let next = points[(i + 1) % n];
            (curr.x - prev.x, curr.y - prev.y) != (next.x - curr.x, next.y - curr.y)
        })
        .map(|i| points[i])
        .collect();

    if corners.is_empty() {
        points[..1].to_vec()
    } else {
        corners
    }
}

fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    Some(BoundingBox {
        x: min_x.max(0) as u32,
        y: min_y.max(0) as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}
