pub mod command;
pub mod nms;
pub mod preprocessing;
pub mod yolo;

use crate::config::{DetectorBackend, ModelConfig};
use crate::error::{WatchError, WatchResult};
use crate::models::{Detection, DroneDetection, round2};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};

pub use command::CommandDetector;
pub use yolo::YoloDetector;

/// A decoded image together with the file it came from
pub struct Frame {
    pub path: PathBuf,
    pub image: DynamicImage,
}

impl Frame {
    pub fn new(path: impl Into<PathBuf>, image: DynamicImage) -> Self {
        Self {
            path: path.into(),
            image,
        }
    }
}

/// Anything that can turn a frame into detections
pub trait Detector {
    fn detect(&self, frame: &Frame) -> WatchResult<Vec<Detection>>;

    /// Human-readable backend name (used in logs)
    fn name(&self) -> &str;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&self, frame: &Frame) -> WatchResult<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Class index to name mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// One name per line; blank lines are skipped
    pub fn load(path: &Path) -> WatchResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            WatchError::Config(format!("cannot read labels {}: {}", path.display(), e))
        })?;
        let names = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self { names })
    }

    /// Labels file if configured, otherwise the inline list
    pub fn from_config(config: &ModelConfig) -> WatchResult<Self> {
        match &config.labels_path {
            Some(path) => Self::load(path),
            None => Ok(Self::new(config.labels.clone())),
        }
    }

    pub fn name(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Build the configured backend
pub fn build_detector(config: &ModelConfig) -> WatchResult<Box<dyn Detector>> {
    let labels = ClassLabels::from_config(config)?;
    let detector: Box<dyn Detector> = match config.backend {
        DetectorBackend::Rten => Box::new(YoloDetector::load(config, labels)?),
        DetectorBackend::Command => Box::new(CommandDetector::from_config(config, labels)?),
    };
    Ok(detector)
}

/// Keep detections whose confidence, rounded to two decimals, is strictly
/// above `threshold`. Order follows the detector's output.
pub fn select_confident(
    detections: &[Detection],
    drone_id: u32,
    threshold: f64,
) -> Vec<DroneDetection> {
    detections
        .iter()
        .filter(|d| round2(d.confidence as f64) > threshold)
        .map(|d| DroneDetection::from_detection(drone_id, d))
        .collect()
}
