use super::*;
use crate::error::CounterError;
use crate::frame::FrameFormat;
use image::{Rgb, RgbImage};
use std::fs;

fn write_frame(dir: &Path, name: &str, value: u8) {
    let image = RgbImage::from_pixel(8, 6, Rgb([value, value, value]));
    image.save(dir.join(name)).unwrap();
}

#[test]
fn test_image_sequence_reads_in_file_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path(), "frame_002.png", 20);
    write_frame(dir.path(), "frame_000.png", 0);
    write_frame(dir.path(), "frame_001.png", 10);
    fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

    let mut source = ImageSequenceSource::open(dir.path()).unwrap();
    assert_eq!(source.remaining(), 3);

    for (expected_index, expected_value) in [(0u64, 0u8), (1, 10), (2, 20)] {
        let frame = source.next_frame().unwrap().expect("frame");
        assert_eq!(frame.index, expected_index);
        assert_eq!(frame.format, FrameFormat::Rgb24);
        assert_eq!(frame.dimensions(), (8, 6));
        assert_eq!(frame.data[0], expected_value);
    }

    assert!(source.next_frame().unwrap().is_none());
    assert!(source.next_frame().unwrap().is_none());
}

#[test]
fn test_undecodable_image_is_malformed_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path(), "a.png", 0);
    fs::write(dir.path().join("b.png"), b"definitely not a png").unwrap();
    write_frame(dir.path(), "c.png", 30);

    let mut source = ImageSequenceSource::open(dir.path()).unwrap();

    assert!(source.next_frame().unwrap().is_some());

    match source.next_frame() {
        Err(CounterError::Source(SourceError::MalformedFrame { frame_index, .. })) => {
            assert_eq!(frame_index, 1);
        }
        other => panic!("Expected malformed frame, got {:?}", other.map(|f| f.is_some())),
    }

    let frame = source.next_frame().unwrap().expect("source continues after bad frame");
    assert_eq!(frame.index, 2);
    assert_eq!(frame.data[0], 30);
}

#[test]
fn test_open_source_rejects_missing_path() {
    let result = open_source("/nonexistent/carcount/Video.mp4");
    match result {
        Err(CounterError::Source(SourceError::Unavailable { source_path, .. })) => {
            assert!(source_path.contains("Video.mp4"));
        }
        _ => panic!("Expected SourceUnavailable for a missing path"),
    }
}

#[test]
fn test_open_source_rejects_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        open_source(dir.path()),
        Err(CounterError::Source(SourceError::Unavailable { .. }))
    ));
}

#[test]
fn test_open_source_uses_image_sequence_for_directories() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path(), "0001.png", 5);

    let mut source = open_source(dir.path()).unwrap();
    assert!(source.describe().starts_with("image sequence"));
    assert!(source.next_frame().unwrap().is_some());

    source.close();
    assert!(source.next_frame().unwrap().is_none());
}

#[test]
fn test_memory_source_drains_in_order() {
    let frames = (0..3)
        .map(|i| FrameData::new(i, vec![i as u8; 4], 2, 2, FrameFormat::Gray8))
        .collect();
    let mut source = MemorySource::new(frames);

    assert_eq!(source.describe(), "memory (3 frames)");
    for i in 0..3 {
        assert_eq!(source.next_frame().unwrap().unwrap().index, i);
    }
    assert_eq!(source.remaining(), 0);
    assert!(source.next_frame().unwrap().is_none());
}

#[cfg(all(feature = "video", target_os = "linux"))]
mod video_file {
    use super::*;
    use gstreamer::prelude::*;

    /// Encode a short test-pattern clip, or None when the encoders are missing
    fn write_clip(path: &Path, frames: u32) -> Option<()> {
        gstreamer::init().ok()?;
        let description = format!(
            "videotestsrc num-buffers={} ! video/x-raw,width=64,height=48,framerate=10/1 ! \
             videoconvert ! jpegenc ! avimux ! filesink location={}",
            frames,
            path.display()
        );
        let pipeline = gstreamer::parse::launch(&description).ok()?;
        pipeline.set_state(gstreamer::State::Playing).ok()?;

        let bus = pipeline.bus()?;
        let finished = bus.timed_pop_filtered(
            gstreamer::ClockTime::from_seconds(10),
            &[gstreamer::MessageType::Eos, gstreamer::MessageType::Error],
        );
        let _ = pipeline.set_state(gstreamer::State::Null);

        match finished?.view() {
            gstreamer::MessageView::Eos(..) => Some(()),
            _ => None,
        }
    }

    #[test]
    fn test_open_source_decodes_video_file() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.avi");
        if write_clip(&clip, 5).is_none() {
            println!("GStreamer encoders not available for testing - skipping video decode test");
            return;
        }

        let mut source = open_source(&clip).unwrap();
        assert!(source.describe().starts_with("video"));

        let mut decoded = 0u64;
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.index, decoded);
            assert_eq!(frame.format, FrameFormat::Rgb24);
            assert_eq!(frame.dimensions(), (64, 48));
            assert_eq!(frame.data.len(), 64 * 48 * 3);
            decoded += 1;
        }
        assert_eq!(decoded, 5);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_non_video_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("Video.mp4");
        fs::write(&bogus, b"not a video stream").unwrap();

        assert!(matches!(
            open_source(&bogus),
            Err(CounterError::Source(SourceError::Unavailable { .. }))
        ));
    }
}
