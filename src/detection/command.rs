//! External detector backend
//!
//! Runs a configured program once per frame with the image path as the last
//! argument. The program prints a JSON array of detections on stdout, e.g.
//! `[{"label": "tank", "class_id": 0, "confidence": 0.91, "box": [x1, y1, x2, y2]}]`

use crate::config::ModelConfig;
use crate::detection::{ClassLabels, Detector, Frame};
use crate::error::{WatchError, WatchResult};
use crate::models::{BoundingBox, Detection};
use serde::Deserialize;
use std::process::{Command, Stdio};
use tracing::{debug, error};

/// Max stderr characters carried into an error message
const STDERR_EXCERPT: usize = 500;

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    class_id: Option<usize>,
    confidence: f32,
    #[serde(rename = "box")]
    bbox: [f32; 4],
}

pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    labels: ClassLabels,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>, labels: ClassLabels) -> Self {
        Self {
            program: program.into(),
            args,
            labels,
        }
    }

    pub fn from_config(config: &ModelConfig, labels: ClassLabels) -> WatchResult<Self> {
        let program = config
            .command
            .clone()
            .ok_or_else(|| WatchError::Config("no detector command configured".into()))?;
        Ok(Self::new(program, config.command_args.clone(), labels))
    }
}

impl Detector for CommandDetector {
    fn detect(&self, frame: &Frame) -> WatchResult<Vec<Detection>> {
        debug!("Running {} {:?} {}", self.program, self.args, frame.path.display());

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&frame.path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                error!("Failed to start detector {}: {}", self.program, e);
                WatchError::Detection(format!("failed to start {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            return Err(WatchError::Detection(if excerpt.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                format!("{} exited with {}: {}", self.program, output.status, excerpt)
            }));
        }

        let (width, height) = (frame.image.width(), frame.image.height());
        let mut detections = parse_detections(&output.stdout, &self.labels)?;
        for detection in &mut detections {
            detection.bbox = detection.bbox.clip(width, height);
        }
        Ok(detections)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Parse detector stdout; a missing label is looked up from `class_id`
pub fn parse_detections(stdout: &[u8], labels: &ClassLabels) -> WatchResult<Vec<Detection>> {
    let raw: Vec<RawDetection> = serde_json::from_slice(stdout)
        .map_err(|e| WatchError::Detection(format!("invalid detector output: {}", e)))?;

    Ok(raw
        .into_iter()
        .map(|r| {
            let class_id = r.class_id.unwrap_or(0);
            let [x1, y1, x2, y2] = r.bbox;
            Detection {
                class_id,
                label: r.label.unwrap_or_else(|| labels.name(class_id)),
                confidence: r.confidence,
                bbox: BoundingBox::new(x1, y1, x2, y2),
            }
        })
        .collect())
}
