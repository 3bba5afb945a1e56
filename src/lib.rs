pub mod analyzer;
pub mod config;
pub mod counter;
pub mod error;
pub mod frame;
pub mod keyboard_input;
pub mod overlay;
pub mod pipeline;
pub mod source;

pub use analyzer::{
    BackgroundSubtractor, Blob, BlobDetector, BoundingBox, Centroid, ForegroundExtractor,
    KnnBackgroundModel, RunningAverageModel,
};
pub use config::CarcountConfig;
pub use counter::{CountingBand, CrossingCounter};
pub use error::{CounterError, Result};
pub use frame::{FrameData, FrameFormat};
pub use keyboard_input::KeyboardInputHandler;
pub use overlay::OverlayRenderer;
pub use pipeline::{
    spawn_session, EndReason, FrameOutput, PipelineDriver, SessionHandle, SessionReport,
    StepOutcome, StopHandle,
};
pub use source::{open_source, FrameSource, ImageSequenceSource, MemorySource};
