use crate::config::ModelConfig;
use crate::detection::nms::class_aware_nms;
use crate::detection::preprocessing::{Letterbox, letterbox, to_input_tensor};
use crate::detection::{ClassLabels, Detector, Frame};
use crate::error::{WatchError, WatchResult};
use crate::models::{BoundingBox, Detection};
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// YOLOv8-style detector running an `.rten` model in-process
pub struct YoloDetector {
    model: Model,
    labels: ClassLabels,
    input_size: u32,
    score_floor: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl YoloDetector {
    pub fn load(config: &ModelConfig, labels: ClassLabels) -> WatchResult<Self> {
        let path: &Path = &config.model_path;
        if !path.exists() {
            return Err(WatchError::NotFound(format!("model file {}", path.display())));
        }

        info!("Loading model: {}", path.display());
        let model = Model::load_file(path)
            .map_err(|e| WatchError::Model(format!("failed to load {}: {}", path.display(), e)))?;
        info!(
            "Model loaded ({} class names, input {}px)",
            labels.len(),
            config.input_size
        );

        Ok(Self {
            model,
            labels,
            input_size: config.input_size,
            score_floor: config.score_floor,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        })
    }

    fn run_model(&self, input: NdTensor<f32, 4>) -> WatchResult<NdTensor<f32, 3>> {
        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| WatchError::Model(format!("inference failed: {}", e)))?;

        output
            .try_into()
            .map_err(|e| WatchError::Model(format!("unexpected model output: {:?}", e)))
    }
}

impl Detector for YoloDetector {
    fn detect(&self, frame: &Frame) -> WatchResult<Vec<Detection>> {
        let (canvas, lb) = letterbox(&frame.image, self.input_size);
        let output = self.run_model(to_input_tensor(&canvas))?;

        let features = output.size(1);
        let anchors = output.size(2);
        let data = output.to_vec();

        let candidates = decode_output(&data, features, anchors, self.score_floor, &self.labels);
        debug!("{} candidates above score floor", candidates.len());

        Ok(postprocess(
            candidates,
            &lb,
            self.iou_threshold,
            self.max_detections,
        ))
    }

    fn name(&self) -> &str {
        "rten-yolo"
    }
}

/// Decode a `[4 + classes, anchors]` head in row-major order.
///
/// Rows 0..4 are cx, cy, w, h in model-input pixels; the remaining rows are
/// per-class scores. Each anchor yields at most one candidate, its best class.
pub fn decode_output(
    data: &[f32],
    features: usize,
    anchors: usize,
    score_floor: f32,
    labels: &ClassLabels,
) -> Vec<Detection> {
    if features <= 4 || data.len() < features * anchors {
        return Vec::new();
    }

    let at = |row: usize, anchor: usize| data[row * anchors + anchor];
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class_id in 0..features - 4 {
            let score = at(4 + class_id, anchor);
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }

        if best_score < score_floor {
            continue;
        }

        candidates.push(Detection {
            class_id: best_class,
            label: labels.name(best_class),
            confidence: best_score,
            bbox: BoundingBox::from_center(
                at(0, anchor),
                at(1, anchor),
                at(2, anchor),
                at(3, anchor),
            ),
        });
    }

    candidates
}

/// NMS, map back to source pixels, cap the count
pub fn postprocess(
    candidates: Vec<Detection>,
    letterbox: &Letterbox,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    let mut kept = class_aware_nms(candidates, iou_threshold);
    kept.truncate(max_detections);
    for detection in &mut kept {
        detection.bbox = letterbox.restore(&detection.bbox);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `[4 + classes, anchors]` buffer from per-anchor columns
    fn head(columns: &[[f32; 6]]) -> Vec<f32> {
        let anchors = columns.len();
        let mut data = vec![0.0; 6 * anchors];
        for (anchor, column) in columns.iter().enumerate() {
            for (row, value) in column.iter().enumerate() {
                data[row * anchors + anchor] = *value;
            }
        }
        data
    }

    #[test]
    fn test_decode_picks_best_class_and_applies_floor() {
        let labels = ClassLabels::new(vec!["tank".into(), "truck".into()]);
        let data = head(&[
            [32.0, 32.0, 10.0, 20.0, 0.1, 0.8],
            [10.0, 10.0, 4.0, 4.0, 0.2, 0.1],
            [50.0, 40.0, 8.0, 8.0, 0.6, 0.3],
        ]);

        let detections = decode_output(&data, 6, 3, 0.25, &labels);
        assert_eq!(detections.len(), 2);

        assert_eq!(detections[0].label, "truck");
        assert_eq!(detections[0].class_id, 1);
        assert_eq!(detections[0].bbox, BoundingBox::new(27.0, 22.0, 37.0, 42.0));

        assert_eq!(detections[1].label, "tank");
        assert!((detections[1].confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_malformed_head() {
        let labels = ClassLabels::default();
        assert!(decode_output(&[0.0; 8], 4, 2, 0.1, &labels).is_empty());
        assert!(decode_output(&[0.0; 5], 6, 3, 0.1, &labels).is_empty());
    }

    #[test]
    fn test_postprocess_maps_to_source_and_caps() {
        let lb = Letterbox {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 10.0,
            src_width: 100,
            src_height: 60,
        };
        let candidates = vec![
            Detection {
                class_id: 0,
                label: "tank".into(),
                confidence: 0.9,
                bbox: BoundingBox::new(10.0, 20.0, 20.0, 30.0),
            },
            Detection {
                class_id: 0,
                label: "tank".into(),
                confidence: 0.5,
                bbox: BoundingBox::new(40.0, 20.0, 45.0, 25.0),
            },
        ];

        let kept = postprocess(candidates, &lb, 0.7, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bbox, BoundingBox::new(20.0, 20.0, 40.0, 40.0));
    }
}
