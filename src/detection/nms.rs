//! Non-maximum suppression over detector candidates

use crate::models::Detection;

/// Greedy NMS within each class.
///
/// Survivors are returned highest confidence first. A candidate is dropped
/// when it overlaps an already kept box of the same class by more than
/// `iou_threshold`.
pub fn class_aware_nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }

        for j in (i + 1)..detections.len() {
            if !suppressed[j]
                && detections[j].class_id == detections[i].class_id
                && detections[i].bbox.iou(&detections[j].bbox) > iou_threshold
            {
                suppressed[j] = true;
            }
        }

        keep.push(detections[i].clone());
    }

    keep
}
