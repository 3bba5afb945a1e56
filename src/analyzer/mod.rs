mod background;
mod blobs;
mod foreground;
mod knn;
pub mod morphology;
#[cfg(test)]
mod tests;

pub use background::{build_subtractor, BackgroundSubtractor, RunningAverageModel};
pub use blobs::{Blob, BlobDetector, BoundingBox, Centroid};
pub use foreground::{gaussian_kernel, ForegroundExtractor};
pub use knn::KnnBackgroundModel;
