use thiserror::Error;

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Report encoding error: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("System error: {message}")]
    System { message: String },
}

impl CounterError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// True when the error only affects a single frame and the session can keep going
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CounterError::Source(SourceError::MalformedFrame { .. }))
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source '{source_path}' unavailable: {details}")]
    Unavailable {
        source_path: String,
        details: String,
    },

    #[error("Malformed frame {frame_index}: {details}")]
    MalformedFrame { frame_index: u64, details: String },
}

impl SourceError {
    pub fn unavailable<P: Into<String>, D: Into<String>>(source_path: P, details: D) -> Self {
        Self::Unavailable {
            source_path: source_path.into(),
            details: details.into(),
        }
    }

    pub fn malformed<D: Into<String>>(frame_index: u64, details: D) -> Self {
        Self::MalformedFrame {
            frame_index,
            details: details.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },

    #[error("Frame is {actual_width}x{actual_height} but the background model is {model_width}x{model_height}")]
    DimensionMismatch {
        model_width: u32,
        model_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A session is already running")]
    AlreadyRunning,

    #[error("No session is running")]
    NotRunning,

    #[error("Session worker failed: {details}")]
    Worker { details: String },
}

pub type Result<T> = std::result::Result<T, CounterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_frame_is_recoverable() {
        let err: CounterError = SourceError::malformed(7, "truncated").into();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("Malformed frame 7"));
    }

    #[test]
    fn test_unavailable_source_is_fatal() {
        let err: CounterError = SourceError::unavailable("missing.mp4", "not found").into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("missing.mp4"));
    }
}
