use serde::{Deserialize, Serialize};

/// Axis-aligned box in original image pixels (corner form)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from the center/size form used by YOLO heads
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Center point, truncated to whole pixels like the drawing code expects
    pub fn center(&self) -> (i32, i32) {
        let (x1, y1, x2, y2) = self.to_pixels();
        let mid = |a: i32, b: i32| ((a as i64 + b as i64) / 2) as i32;
        (mid(x1, x2), mid(y1, y2))
    }

    pub fn to_pixels(&self) -> (i32, i32, i32, i32) {
        (self.x1 as i32, self.y1 as i32, self.x2 as i32, self.y2 as i32)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }

        intersection / union
    }

    /// Clamp to `[0, width] x [0, height]`
    pub fn clip(&self, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Corner coordinates rounded to two decimals, in `[x1, y1, x2, y2]` order
    pub fn rounded(&self) -> [f64; 4] {
        [
            round2(self.x1 as f64),
            round2(self.y1 as f64),
            round2(self.x2 as f64),
            round2(self.y2 as f64),
        ]
    }
}

/// A single object reported by a detector
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// One entry of the result datagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneDetection {
    pub drone_id: u32,
    pub label: String,
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
}

impl DroneDetection {
    pub fn from_detection(drone_id: u32, detection: &Detection) -> Self {
        Self {
            drone_id,
            label: detection.label.clone(),
            bbox: detection.bbox.rounded(),
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
