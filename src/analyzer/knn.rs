use super::background::{check_dimensions, BackgroundSubtractor};
use crate::config::BackgroundConfig;
use crate::error::{AnalyzerError, Result};

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

const FOREGROUND: u8 = 255;
const BACKGROUND: u8 = 0;

/// One remembered intensity and whether it was judged background when stored
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Sample {
    value: u8,
    include: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Foreground,
    Background,
    Shadow,
}

/// How many frames pass between sample replacements in each bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpdateSchedule {
    pub short: u32,
    pub mid: u32,
    pub long: u32,
}

impl UpdateSchedule {
    /// Derive bank refresh periods from a learning rate so that the three
    /// banks approximate an exponential forgetting curve
    pub(crate) fn for_rate(learning_rate: f64, samples: u32) -> Self {
        let decay = (1.0 - learning_rate).ln();
        let steps = |fraction: f64| ((fraction.ln() / decay) as i64).max(0);

        let k_short = steps(0.7) + 1;
        let k_mid = (steps(0.4) - k_short + 1).max(0);
        let k_long = (steps(0.1) - k_short - k_mid + 1).max(0);

        let samples = i64::from(samples.max(1));
        Self {
            short: (k_short / samples + 1) as u32,
            mid: (k_mid / samples + 1) as u32,
            long: (k_long / samples + 1) as u32,
        }
    }
}

/// Per-pixel state for one bank: circular write index and the counter value
/// at which the next replacement happens
#[derive(Debug, Clone)]
struct Bank {
    write_index: Vec<u32>,
    next_update: Vec<u32>,
    counter: u32,
}

impl Bank {
    fn new(pixels: usize) -> Self {
        Self {
            write_index: vec![0; pixels],
            next_update: vec![0; pixels],
            counter: 0,
        }
    }

    /// Advance the frame counter, re-drawing every pixel's next update slot
    /// once a full period has elapsed
    fn tick(&mut self, period: u32, rng: &mut StdRng) {
        self.counter += 1;
        if self.counter >= period {
            self.counter = 0;
            for next in self.next_update.iter_mut() {
                *next = rng.gen_range(0..period);
            }
        }
    }
}

/// K-nearest-neighbours background model with short, mid and long term
/// sample banks and optional shadow labelling
pub struct KnnBackgroundModel {
    history: u32,
    dist2_threshold: f32,
    samples: usize,
    k_nearest: usize,
    detect_shadows: bool,
    shadow_value: u8,
    shadow_threshold: f32,
    learning_rate: Option<f64>,
    seed: u64,
    dimensions: Option<(u32, u32)>,
    model: Vec<Sample>,
    short: Bank,
    mid: Bank,
    long: Bank,
    frames_seen: u64,
    rng: StdRng,
}

impl KnnBackgroundModel {
    pub fn new(config: &BackgroundConfig) -> Self {
        Self {
            history: config.history.max(1),
            dist2_threshold: config.dist2_threshold,
            samples: config.samples.max(1) as usize,
            k_nearest: config.k_nearest.max(1) as usize,
            detect_shadows: config.detect_shadows,
            shadow_value: config.shadow_value,
            shadow_threshold: config.shadow_threshold,
            learning_rate: config.learning_rate,
            seed: config.seed,
            dimensions: None,
            model: Vec::new(),
            short: Bank::new(0),
            mid: Bank::new(0),
            long: Bank::new(0),
            frames_seen: 0,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    fn initialize(&mut self, width: u32, height: u32) {
        let pixels = width as usize * height as usize;
        info!(
            "Initializing KNN background model at {}x{} ({} samples per pixel)",
            width,
            height,
            self.samples * 3
        );

        self.dimensions = Some((width, height));
        self.model = vec![Sample::default(); pixels * self.samples * 3];
        self.short = Bank::new(pixels);
        self.mid = Bank::new(pixels);
        self.long = Bank::new(pixels);
        self.frames_seen = 0;
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    fn current_learning_rate(&self) -> f64 {
        match self.learning_rate {
            Some(rate) if self.frames_seen > 1 => rate,
            _ => {
                let span = (2 * self.frames_seen).min(u64::from(self.history)).max(1);
                1.0 / span as f64
            }
        }
    }

    fn classify(&self, pixel_samples: &[Sample], value: u8) -> (Classification, bool) {
        let value = f32::from(value);
        let mut close = 0;
        let mut close_background = 0;

        for sample in pixel_samples {
            let diff = f32::from(sample.value) - value;
            if diff * diff < self.dist2_threshold {
                close += 1;
                if sample.include {
                    close_background += 1;
                    if close_background >= self.k_nearest {
                        return (Classification::Background, true);
                    }
                }
            }
        }

        let include = close >= self.k_nearest;

        if self.detect_shadows {
            let mut shadows = 0;
            for sample in pixel_samples.iter().filter(|s| s.include) {
                let mean = f32::from(sample.value);
                let numerator = value * mean;
                let denominator = mean * mean;

                if denominator == 0.0 {
                    return (Classification::Foreground, include);
                }

                if numerator <= denominator && numerator >= self.shadow_threshold * denominator {
                    let attenuation = numerator / denominator;
                    let diff = attenuation * mean - value;
                    if diff * diff < self.dist2_threshold * attenuation * attenuation {
                        shadows += 1;
                        if shadows >= self.k_nearest {
                            return (Classification::Shadow, include);
                        }
                    }
                }
            }
        }

        (Classification::Foreground, include)
    }

    /// Push the new value into the short bank and cascade the slots it
    /// displaces into the mid and long banks when their turn comes up
    fn update_pixel(&mut self, pixel: usize, value: u8, include: bool) {
        let n = self.samples;
        let base = pixel * n * 3;
        let short_slot = base + self.short.write_index[pixel] as usize;
        let mid_slot = base + n + self.mid.write_index[pixel] as usize;
        let long_slot = base + 2 * n + self.long.write_index[pixel] as usize;

        if self.long.next_update[pixel] == self.long.counter {
            self.model[long_slot] = self.model[mid_slot];
            advance(&mut self.long.write_index[pixel], n);
        }

        if self.mid.next_update[pixel] == self.mid.counter {
            self.model[mid_slot] = self.model[short_slot];
            advance(&mut self.mid.write_index[pixel], n);
        }

        if self.short.next_update[pixel] == self.short.counter {
            self.model[short_slot] = Sample { value, include };
            advance(&mut self.short.write_index[pixel], n);
        }
    }
}

fn advance(index: &mut u32, samples: usize) {
    *index = if *index as usize + 1 >= samples {
        0
    } else {
        *index + 1
    };
}

impl BackgroundSubtractor for KnnBackgroundModel {
    fn apply(&mut self, frame: &GrayImage) -> Result<GrayImage> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(AnalyzerError::FrameProcessing {
                details: "empty frame".to_string(),
            }
            .into());
        }

        match self.dimensions {
            Some(dimensions) => check_dimensions(dimensions, frame)?,
            None => self.initialize(width, height),
        }

        self.frames_seen += 1;
        let rate = self.current_learning_rate();
        let schedule = UpdateSchedule::for_rate(rate, self.samples as u32);

        let bank_len = self.samples * 3;
        let mut mask = GrayImage::new(width, height);

        for (pixel, (source, target)) in frame.pixels().zip(mask.pixels_mut()).enumerate() {
            let value = source[0];
            let samples = &self.model[pixel * bank_len..(pixel + 1) * bank_len];
            let (class, include) = self.classify(samples, value);

            self.update_pixel(pixel, value, include);

            target[0] = match class {
                Classification::Foreground => FOREGROUND,
                Classification::Background => BACKGROUND,
                Classification::Shadow => self.shadow_value,
            };
        }

        self.short.tick(schedule.short, &mut self.rng);
        self.mid.tick(schedule.mid, &mut self.rng);
        self.long.tick(schedule.long, &mut self.rng);

        debug!(
            "KNN frame {} applied (rate {:.4}, refresh {}/{}/{})",
            self.frames_seen, rate, schedule.short, schedule.mid, schedule.long
        );

        Ok(mask)
    }

    fn reset(&mut self) {
        self.dimensions = None;
        self.model.clear();
        self.short = Bank::new(0);
        self.mid = Bank::new(0);
        self.long = Bank::new(0);
        self.frames_seen = 0;
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}
