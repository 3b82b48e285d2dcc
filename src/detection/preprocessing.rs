use crate::models::BoundingBox;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use rten_tensor::NdTensor;

/// Gray used by YOLO exports to pad letterboxed inputs
pub const PAD_VALUE: u8 = 114;

/// How an image was scaled and padded into the model's square input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub src_width: u32,
    pub src_height: u32,
}

impl Letterbox {
    /// Map a box in model-input coordinates back onto the source image
    pub fn restore(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: (bbox.x1 - self.pad_x) / self.scale,
            y1: (bbox.y1 - self.pad_y) / self.scale,
            x2: (bbox.x2 - self.pad_x) / self.scale,
            y2: (bbox.y2 - self.pad_y) / self.scale,
        }
        .clip(self.src_width, self.src_height)
    }
}

/// Resize keeping aspect ratio and center on a `size` x `size` gray canvas
pub fn letterbox(img: &DynamicImage, size: u32) -> (RgbImage, Letterbox) {
    let rgb = img.to_rgb8();
    let (src_width, src_height) = rgb.dimensions();

    let scale = (size as f32 / src_width as f32).min(size as f32 / src_height as f32);
    let new_width = ((src_width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((src_height as f32 * scale).round() as u32).clamp(1, size);

    let resized = if (new_width, new_height) == (src_width, src_height) {
        rgb
    } else {
        imageops::resize(&rgb, new_width, new_height, FilterType::Triangle)
    };

    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(&mut canvas, &resized, pad_x.into(), pad_y.into());

    let letterbox = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        src_width,
        src_height,
    };

    (canvas, letterbox)
}

/// NCHW float tensor scaled to [0, 1]
pub fn to_input_tensor(img: &RgbImage) -> NdTensor<f32, 4> {
    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    let plane = w * h;

    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * w + x as usize;
        for c in 0..3 {
            data[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }

    NdTensor::from_data([1, 3, h, w], data)
}
