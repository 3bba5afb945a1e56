use super::FrameSource;
use crate::error::{Result, SourceError};
use crate::frame::{FrameData, FrameFormat};
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::path::Path;
use tracing::{debug, info, warn};

/// GStreamer-backed decoder for video files, pulled one RGB frame at a time
pub struct GstVideoSource {
    location: String,
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    next_index: u64,
}

impl GstVideoSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let location = path.as_ref().to_string_lossy().to_string();

        gstreamer::init().map_err(|e| {
            SourceError::unavailable(
                location.clone(),
                format!("Failed to initialize GStreamer: {}", e),
            )
        })?;

        let pipeline_desc = "filesrc name=src ! \
             decodebin ! \
             videoconvert ! \
             video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=4 drop=false enable-last-sample=false";

        debug!("Creating GStreamer decode pipeline: {}", pipeline_desc);

        let unavailable = |details: String| SourceError::unavailable(location.clone(), details);

        let pipeline = gstreamer::parse::launch(pipeline_desc)
            .map_err(|e| unavailable(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| unavailable("Failed to downcast to Pipeline".to_string()))?;

        let filesrc = pipeline
            .by_name("src")
            .ok_or_else(|| unavailable("Failed to get filesrc element".to_string()))?;
        filesrc.set_property("location", location.as_str());

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| unavailable("Failed to get appsink element".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| unavailable("Failed to downcast to AppSink".to_string()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| unavailable(format!("Failed to start pipeline: {}", e)))?;

        // Wait for preroll so that unreadable or non-video files fail here
        let (state_change, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(10));
        if state_change.is_err() {
            let details = Self::bus_error(&pipeline)
                .unwrap_or_else(|| "pipeline failed to preroll".to_string());
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(unavailable(details).into());
        }

        info!("GStreamer video source ready: {}", location);

        Ok(Self {
            location,
            pipeline: Some(pipeline),
            appsink: Some(appsink),
            next_index: 0,
        })
    }

    /// Pop the first error message posted on the pipeline bus, if any
    fn bus_error(pipeline: &Pipeline) -> Option<String> {
        let bus = pipeline.bus()?;
        let message = bus.pop_filtered(&[gstreamer::MessageType::Error])?;
        match message.view() {
            gstreamer::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        }
    }

    /// Copy a decoded RGB sample into a tightly packed frame
    fn sample_to_frame(index: u64, sample: &gstreamer::Sample) -> Result<FrameData> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| SourceError::malformed(index, "No buffer in sample"))?;

        let caps = sample
            .caps()
            .ok_or_else(|| SourceError::malformed(index, "No caps in sample"))?;

        let video_info = VideoInfo::from_caps(caps).map_err(|e| {
            SourceError::malformed(index, format!("Failed to get video info: {}", e))
        })?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;
        let row_bytes = width as usize * 3;

        let map = buffer
            .map_readable()
            .map_err(|e| SourceError::malformed(index, format!("Failed to map buffer: {}", e)))?;
        let bytes = map.as_slice();

        if width == 0 || height == 0 {
            return Err(SourceError::malformed(index, "decoder produced an empty frame").into());
        }

        if stride < row_bytes || bytes.len() < stride * (height as usize - 1) + row_bytes {
            return Err(SourceError::malformed(
                index,
                format!(
                    "buffer of {} bytes too small for {}x{} (stride {})",
                    bytes.len(),
                    width,
                    height,
                    stride
                ),
            )
            .into());
        }

        // RGB rows are padded to 4-byte boundaries by GStreamer
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in bytes.chunks(stride).take(height as usize) {
            data.extend_from_slice(&row[..row_bytes]);
        }

        Ok(FrameData::new(index, data, width, height, FrameFormat::Rgb24))
    }
}

impl FrameSource for GstVideoSource {
    fn next_frame(&mut self) -> Result<Option<FrameData>> {
        let Some(appsink) = &self.appsink else {
            return Ok(None);
        };

        let sample = match appsink.pull_sample() {
            Ok(sample) => sample,
            Err(_) => {
                if !appsink.is_eos() {
                    if let Some(pipeline) = &self.pipeline {
                        if let Some(details) = Self::bus_error(pipeline) {
                            warn!("Video decode stopped for {}: {}", self.location, details);
                        }
                    }
                }
                debug!("End of stream reached for {}", self.location);
                self.close();
                return Ok(None);
            }
        };

        let index = self.next_index;
        self.next_index += 1;

        Self::sample_to_frame(index, &sample).map(Some)
    }

    fn describe(&self) -> String {
        format!("video {}", self.location)
    }

    fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            debug!("Stopping GStreamer decode pipeline");
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop GStreamer pipeline cleanly: {}", e);
            }
        }
        self.appsink = None;
    }
}

impl Drop for GstVideoSource {
    fn drop(&mut self) {
        self.close();
    }
}
