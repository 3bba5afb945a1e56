use super::*;
use crate::config::{BackgroundAlgorithm, BackgroundConfig, BlobConfig, ForegroundConfig};
use crate::error::{AnalyzerError, CounterError};
use crate::frame::FrameData;
use image::{GrayImage, Luma, Rgb, RgbImage};

fn scene(width: u32, height: u32, rect: Option<(u32, u32, u32, u32)>) -> FrameData {
    let mut image = RgbImage::from_pixel(width, height, Rgb([100, 100, 100]));
    if let Some((x0, y0, w, h)) = rect {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                image.put_pixel(x, y, Rgb([220, 220, 220]));
            }
        }
    }
    FrameData::from_rgb(0, image)
}

fn running_average_extractor() -> ForegroundExtractor {
    let background = BackgroundConfig {
        algorithm: BackgroundAlgorithm::RunningAverage,
        ..BackgroundConfig::default()
    };
    ForegroundExtractor::new(&ForegroundConfig::default(), &background)
}

#[test]
fn test_gaussian_kernel_is_normalised_and_symmetric() {
    let kernel = gaussian_kernel(3, 5.0);
    assert_eq!(kernel.len(), 3);
    assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    assert!((kernel[0] - kernel[2]).abs() < 1e-6);
    assert!((kernel[0] - 0.3311).abs() < 1e-3);
    assert!((kernel[1] - 0.3378).abs() < 1e-3);

    assert_eq!(gaussian_kernel(1, 5.0), vec![1.0]);
}

#[test]
fn test_running_average_first_frame_is_empty_mask() {
    let mut model = RunningAverageModel::new(25, 0.05);
    let frame = GrayImage::from_pixel(8, 8, Luma([100]));

    let mask = model.apply(&frame).unwrap();
    assert!(mask.pixels().all(|p| p[0] == 0));
    assert_eq!(model.frames_seen(), 1);
    assert!(model.background().is_some());
}

#[test]
fn test_running_average_flags_large_changes_only() {
    let mut model = RunningAverageModel::new(25, 0.05);
    model.apply(&GrayImage::from_pixel(8, 8, Luma([100]))).unwrap();

    let mut frame = GrayImage::from_pixel(8, 8, Luma([110]));
    frame.put_pixel(3, 3, Luma([200]));

    let mask = model.apply(&frame).unwrap();
    assert_eq!(mask.get_pixel(3, 3)[0], 255);
    assert_eq!(mask.get_pixel(0, 0)[0], 0);

    let background = model.background().unwrap();
    assert_eq!(background.get_pixel(0, 0)[0], 100);
    assert!((104..=105).contains(&background.get_pixel(3, 3)[0]));
}

#[test]
fn test_running_average_rejects_dimension_change() {
    let mut model = RunningAverageModel::new(25, 0.05);
    model.apply(&GrayImage::new(8, 8)).unwrap();

    assert!(matches!(
        model.apply(&GrayImage::new(4, 4)),
        Err(CounterError::Analyzer(AnalyzerError::DimensionMismatch { .. }))
    ));
}

#[test]
fn test_build_subtractor_honours_algorithm() {
    let mut knn = build_subtractor(&BackgroundConfig::default());
    let first = knn.apply(&GrayImage::from_pixel(4, 4, Luma([90]))).unwrap();
    assert!(first.pixels().all(|p| p[0] == 255));

    let mut average = build_subtractor(&BackgroundConfig {
        algorithm: BackgroundAlgorithm::RunningAverage,
        ..BackgroundConfig::default()
    });
    let first = average.apply(&GrayImage::from_pixel(4, 4, Luma([90]))).unwrap();
    assert!(first.pixels().all(|p| p[0] == 0));
}

#[test]
fn test_extractor_mask_covers_moving_object() {
    let mut extractor = running_average_extractor();

    extractor.apply(&scene(120, 100, None)).unwrap();
    let mask = extractor.apply(&scene(120, 100, Some((30, 20, 50, 50)))).unwrap();

    assert_eq!(mask.dimensions(), (120, 100));
    assert_eq!(mask.get_pixel(55, 45)[0], 255);
    assert_eq!(mask.get_pixel(5, 5)[0], 0);
    assert_eq!(mask.get_pixel(110, 90)[0], 0);
    assert_eq!(extractor.frames_seen(), 2);
}

#[test]
fn test_extractor_output_feeds_blob_detector() {
    let mut extractor = running_average_extractor();
    let detector = BlobDetector::new(&BlobConfig {
        min_width: 40,
        min_height: 40,
    });

    extractor.apply(&scene(160, 140, None)).unwrap();
    let mask = extractor.apply(&scene(160, 140, Some((60, 65, 50, 50)))).unwrap();

    let blobs: Vec<Blob> = detector.extract(&mask).collect();
    assert_eq!(blobs.len(), 1);

    // Dilation grows the region by a couple of pixels on each side
    let blob = blobs[0];
    assert!(blob.bounding_box.width >= 50 && blob.bounding_box.width <= 58);
    assert!((83..=87).contains(&blob.centroid.x));
    assert!((88..=92).contains(&blob.centroid.y));
}

#[test]
fn test_extractor_keeps_nearby_objects_apart() {
    let mut extractor = running_average_extractor();
    let detector = BlobDetector::new(&BlobConfig {
        min_width: 20,
        min_height: 20,
    });

    // Blur and dilation eat 6 px of the 12 px gap; each closing pass must
    // leave the remaining 6 px open
    let mut image = RgbImage::from_pixel(160, 80, Rgb([100, 100, 100]));
    for y in 25..55 {
        for x in (20..50).chain(62..92) {
            image.put_pixel(x, y, Rgb([220, 220, 220]));
        }
    }

    extractor.apply(&scene(160, 80, None)).unwrap();
    let mask = extractor.apply(&FrameData::from_rgb(1, image)).unwrap();

    assert_eq!(mask.get_pixel(56, 40)[0], 0);
    let blobs: Vec<Blob> = detector.extract(&mask).collect();
    assert_eq!(blobs.len(), 2);
}

#[test]
fn test_extractor_reset_restarts_model() {
    let mut extractor = running_average_extractor();
    extractor.apply(&scene(32, 32, None)).unwrap();
    extractor.reset();
    assert_eq!(extractor.frames_seen(), 0);

    // After a reset a different frame size is accepted
    let mask = extractor.apply(&scene(16, 16, None)).unwrap();
    assert_eq!(mask.dimensions(), (16, 16));
}
