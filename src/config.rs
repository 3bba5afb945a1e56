use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CarcountConfig {
    pub source: SourceConfig,
    pub line: LineConfig,
    pub blob: BlobConfig,
    pub foreground: ForegroundConfig,
    pub background: BackgroundConfig,
    pub overlay: OverlayConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    /// Video file or directory of still frames
    #[serde(default = "default_source_path")]
    pub path: String,

    /// Consecutive undecodable frames tolerated before the stream is treated as ended
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    /// Pixel row of the virtual counting line
    #[serde(default = "default_count_line")]
    pub count_line: u32,

    /// Half-height of the crossing band around the line
    #[serde(default = "default_offset")]
    pub offset: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct BlobConfig {
    /// Minimum bounding box width for a blob to be tracked
    #[serde(default = "default_min_width")]
    pub min_width: u32,

    /// Minimum bounding box height for a blob to be tracked
    #[serde(default = "default_min_height")]
    pub min_height: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ForegroundConfig {
    /// Gaussian kernel size (odd)
    #[serde(default = "default_blur_kernel")]
    pub blur_kernel: u32,

    /// Gaussian sigma
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,

    /// Square dilation kernel size applied to the raw mask (odd)
    #[serde(default = "default_dilate_kernel")]
    pub dilate_kernel: u32,

    /// Elliptical closing kernel size (odd)
    #[serde(default = "default_close_kernel")]
    pub close_kernel: u32,

    /// Number of closing passes
    #[serde(default = "default_close_iterations")]
    pub close_iterations: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundAlgorithm {
    /// K-nearest-neighbours sample history per pixel
    Knn,
    /// Running average with absolute difference threshold
    RunningAverage,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackgroundConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: BackgroundAlgorithm,

    /// Frames over which the automatic learning rate settles
    #[serde(default = "default_history")]
    pub history: u32,

    /// Squared intensity distance under which a sample matches
    #[serde(default = "default_dist2_threshold")]
    pub dist2_threshold: f32,

    /// Samples kept per pixel for each of the short, mid and long histories
    #[serde(default = "default_samples")]
    pub samples: u32,

    /// Matching samples needed to call a pixel background
    #[serde(default = "default_k_nearest")]
    pub k_nearest: u32,

    #[serde(default = "default_detect_shadows")]
    pub detect_shadows: bool,

    /// Mask value written for shadow pixels
    #[serde(default = "default_shadow_value")]
    pub shadow_value: u8,

    /// Lowest brightness ratio still considered a shadow
    #[serde(default = "default_shadow_threshold")]
    pub shadow_threshold: f32,

    /// Fixed learning rate in (0, 1]; automatic when unset
    #[serde(default)]
    pub learning_rate: Option<f64>,

    /// Seed for per-pixel sample replacement
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Difference threshold for the running average model
    #[serde(default = "default_delta_threshold")]
    pub delta_threshold: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OverlayConfig {
    #[serde(default = "default_overlay_enabled")]
    pub enabled: bool,

    /// TrueType font used for the counter text
    #[serde(default = "default_font_path")]
    pub font_path: String,

    #[serde(default = "default_font_size")]
    pub font_size: f32,

    #[serde(default = "default_line_thickness")]
    pub line_thickness: u32,

    #[serde(default = "default_box_thickness")]
    pub box_thickness: u32,

    #[serde(default = "default_centroid_radius")]
    pub centroid_radius: u32,

    /// Text drawn in front of the running count
    #[serde(default = "default_label")]
    pub label: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Maximum uncounted centroids kept between frames (0 = unbounded)
    #[serde(default = "default_working_set_capacity")]
    pub working_set_capacity: usize,

    /// Annotated frames buffered between the pipeline and its consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl CarcountConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from_file("carcount.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("source.path", default_source_path())?
            .set_default(
                "source.max_consecutive_failures",
                default_max_consecutive_failures() as i64,
            )?
            .set_default("line.count_line", default_count_line() as i64)?
            .set_default("line.offset", default_offset() as i64)?
            .set_default("blob.min_width", default_min_width() as i64)?
            .set_default("blob.min_height", default_min_height() as i64)?
            .set_default("foreground.blur_kernel", default_blur_kernel() as i64)?
            .set_default("foreground.blur_sigma", default_blur_sigma() as f64)?
            .set_default("foreground.dilate_kernel", default_dilate_kernel() as i64)?
            .set_default("foreground.close_kernel", default_close_kernel() as i64)?
            .set_default(
                "foreground.close_iterations",
                default_close_iterations() as i64,
            )?
            .set_default("background.algorithm", "knn")?
            .set_default("background.history", default_history() as i64)?
            .set_default(
                "background.dist2_threshold",
                default_dist2_threshold() as f64,
            )?
            .set_default("background.samples", default_samples() as i64)?
            .set_default("background.k_nearest", default_k_nearest() as i64)?
            .set_default("background.detect_shadows", default_detect_shadows())?
            .set_default("background.shadow_value", default_shadow_value() as i64)?
            .set_default(
                "background.shadow_threshold",
                default_shadow_threshold() as f64,
            )?
            .set_default("background.seed", default_seed() as i64)?
            .set_default(
                "background.delta_threshold",
                default_delta_threshold() as i64,
            )?
            .set_default("overlay.enabled", default_overlay_enabled())?
            .set_default("overlay.font_path", default_font_path())?
            .set_default("overlay.font_size", default_font_size() as f64)?
            .set_default("overlay.line_thickness", default_line_thickness() as i64)?
            .set_default("overlay.box_thickness", default_box_thickness() as i64)?
            .set_default("overlay.centroid_radius", default_centroid_radius() as i64)?
            .set_default("overlay.label", default_label())?
            .set_default(
                "session.working_set_capacity",
                default_working_set_capacity() as i64,
            )?
            .set_default(
                "session.channel_capacity",
                default_channel_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables, e.g. CARCOUNT_LINE__COUNT_LINE=480
            .add_source(
                Environment::with_prefix("CARCOUNT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: CarcountConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.line.offset == 0 {
            return Err(ConfigError::Message(
                "Line offset must be greater than 0".to_string(),
            ));
        }

        if self.blob.min_width == 0 || self.blob.min_height == 0 {
            return Err(ConfigError::Message(
                "Minimum blob width and height must be greater than 0".to_string(),
            ));
        }

        for (name, size) in [
            ("blur_kernel", self.foreground.blur_kernel),
            ("dilate_kernel", self.foreground.dilate_kernel),
            ("close_kernel", self.foreground.close_kernel),
        ] {
            if size == 0 || size % 2 == 0 {
                return Err(ConfigError::Message(format!(
                    "Foreground {} must be a positive odd number, got {}",
                    name, size
                )));
            }
        }

        if self.foreground.blur_sigma <= 0.0 {
            return Err(ConfigError::Message(
                "Foreground blur_sigma must be greater than 0".to_string(),
            ));
        }

        let background = &self.background;
        if background.history == 0 {
            return Err(ConfigError::Message(
                "Background history must be greater than 0".to_string(),
            ));
        }

        if background.samples == 0 || background.samples > 64 {
            return Err(ConfigError::Message(format!(
                "Background samples must be within 1..=64, got {}",
                background.samples
            )));
        }

        if background.k_nearest == 0 || background.k_nearest > background.samples * 3 {
            return Err(ConfigError::Message(format!(
                "Background k_nearest must be within 1..={}, got {}",
                background.samples * 3,
                background.k_nearest
            )));
        }

        if let Some(rate) = background.learning_rate {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(ConfigError::Message(format!(
                    "Background learning_rate must be within (0, 1], got {}",
                    rate
                )));
            }
        }

        if !(background.shadow_threshold > 0.0 && background.shadow_threshold < 1.0) {
            return Err(ConfigError::Message(format!(
                "Background shadow_threshold must be within (0, 1), got {}",
                background.shadow_threshold
            )));
        }

        if self.overlay.font_size <= 0.0 {
            return Err(ConfigError::Message(
                "Overlay font_size must be greater than 0".to_string(),
            ));
        }

        if self.session.channel_capacity == 0 {
            return Err(ConfigError::Message(
                "Session channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as a TOML document
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for CarcountConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            line: LineConfig::default(),
            blob: BlobConfig::default(),
            foreground: ForegroundConfig::default(),
            background: BackgroundConfig::default(),
            overlay: OverlayConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            count_line: default_count_line(),
            offset: default_offset(),
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            min_width: default_min_width(),
            min_height: default_min_height(),
        }
    }
}

impl Default for ForegroundConfig {
    fn default() -> Self {
        Self {
            blur_kernel: default_blur_kernel(),
            blur_sigma: default_blur_sigma(),
            dilate_kernel: default_dilate_kernel(),
            close_kernel: default_close_kernel(),
            close_iterations: default_close_iterations(),
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            history: default_history(),
            dist2_threshold: default_dist2_threshold(),
            samples: default_samples(),
            k_nearest: default_k_nearest(),
            detect_shadows: default_detect_shadows(),
            shadow_value: default_shadow_value(),
            shadow_threshold: default_shadow_threshold(),
            learning_rate: None,
            seed: default_seed(),
            delta_threshold: default_delta_threshold(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: default_overlay_enabled(),
            font_path: default_font_path(),
            font_size: default_font_size(),
            line_thickness: default_line_thickness(),
            box_thickness: default_box_thickness(),
            centroid_radius: default_centroid_radius(),
            label: default_label(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            working_set_capacity: default_working_set_capacity(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

// Default value functions
fn default_source_path() -> String {
    "Video.mp4".to_string()
}
fn default_max_consecutive_failures() -> u32 {
    30
}

fn default_count_line() -> u32 {
    550
}
fn default_offset() -> u32 {
    6
}
fn default_min_width() -> u32 {
    40
}
fn default_min_height() -> u32 {
    40
}

fn default_blur_kernel() -> u32 {
    3
}
fn default_blur_sigma() -> f32 {
    5.0
}
fn default_dilate_kernel() -> u32 {
    5
}
fn default_close_kernel() -> u32 {
    5
}
fn default_close_iterations() -> u32 {
    2
}

fn default_algorithm() -> BackgroundAlgorithm {
    BackgroundAlgorithm::Knn
}
fn default_history() -> u32 {
    500
}
fn default_dist2_threshold() -> f32 {
    400.0
}
fn default_samples() -> u32 {
    7
}
fn default_k_nearest() -> u32 {
    3
}
fn default_detect_shadows() -> bool {
    true
}
fn default_shadow_value() -> u8 {
    127
}
fn default_shadow_threshold() -> f32 {
    0.5
}
fn default_seed() -> u64 {
    0x0c0f_fee5
}
fn default_delta_threshold() -> u8 {
    25
}

fn default_overlay_enabled() -> bool {
    true
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    48.0
}
fn default_line_thickness() -> u32 {
    3
}
fn default_box_thickness() -> u32 {
    2
}
fn default_centroid_radius() -> u32 {
    4
}
fn default_label() -> String {
    "Car Counter".to_string()
}

fn default_working_set_capacity() -> usize {
    4096
}
fn default_channel_capacity() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CarcountConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.line.count_line, 550);
        assert_eq!(config.line.offset, 6);
        assert_eq!(config.blob.min_width, 40);
        assert_eq!(config.blob.min_height, 40);
        assert_eq!(config.background.algorithm, BackgroundAlgorithm::Knn);
        assert_eq!(config.background.history, 500);
        assert_eq!(config.background.samples, 7);
        assert!(config.background.learning_rate.is_none());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[line]
count_line = 300
offset = 10

[background]
algorithm = "running_average"
learning_rate = 0.1
"#
        )
        .unwrap();

        let config = CarcountConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.line.count_line, 300);
        assert_eq!(config.line.offset, 10);
        assert_eq!(
            config.background.algorithm,
            BackgroundAlgorithm::RunningAverage
        );
        assert_eq!(config.background.learning_rate, Some(0.1));
        // Untouched sections keep their defaults
        assert_eq!(config.blob.min_width, 40);
        assert_eq!(config.foreground.close_iterations, 2);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = CarcountConfig::load_from_file("definitely-not-here.toml").unwrap();
        assert_eq!(config.line.count_line, 550);
        assert_eq!(config.source.path, "Video.mp4");
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("CARCOUNT_SESSION__CHANNEL_CAPACITY", "11");

        let config = CarcountConfig::load_from_file("definitely-not-here.toml").unwrap();
        assert_eq!(config.session.channel_capacity, 11);

        env::remove_var("CARCOUNT_SESSION__CHANNEL_CAPACITY");
    }

    #[test]
    fn test_config_validation() {
        let mut config = CarcountConfig::default();

        config.line.offset = 0;
        assert!(config.validate().is_err());
        config.line.offset = 6;

        config.foreground.close_kernel = 4;
        assert!(config.validate().is_err());
        config.foreground.close_kernel = 5;

        config.background.learning_rate = Some(0.0);
        assert!(config.validate().is_err());
        config.background.learning_rate = Some(1.0);
        assert!(config.validate().is_ok());

        config.background.k_nearest = 22;
        assert!(config.validate().is_err());
        config.background.k_nearest = 3;

        config.session.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let rendered = CarcountConfig::default().to_toml().unwrap();
        assert!(rendered.contains("count_line = 550"));
        assert!(rendered.contains("algorithm = \"knn\""));

        let parsed: CarcountConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.line, LineConfig { count_line: 550, offset: 6 });
    }
}
