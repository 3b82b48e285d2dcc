use crate::error::{WatchError, WatchResult};
use crate::models::Detection;
use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const BANNER_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const BOX_THICKNESS: u32 = 2;
const CENTER_RADIUS: i32 = 5;
const LABEL_SCALE: f32 = 16.0;
const BANNER_SCALE: f32 = 30.0;
/// Gap between a box's top edge and the baseline of its label
const LABEL_OFFSET: i32 = 10;
/// Coordinates are clamped this far outside the canvas before drawing
const OFFSCREEN_MARGIN: i32 = 64;

/// Draws detection overlays and writes them next to the watched images
pub struct Annotator {
    font: Option<FontVec>,
    output_subdir: String,
}

impl Annotator {
    /// Without a font only boxes and center dots are drawn
    pub fn new(font_path: Option<&Path>, output_subdir: impl Into<String>) -> WatchResult<Self> {
        let font = match font_path {
            Some(path) => {
                let data = fs::read(path)?;
                let font = FontVec::try_from_vec(data).map_err(|e| {
                    WatchError::Config(format!("invalid font {}: {}", path.display(), e))
                })?;
                Some(font)
            }
            None => None,
        };

        Ok(Self {
            font,
            output_subdir: output_subdir.into(),
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Overlay every detection plus the drone banner onto a copy of `image`
    pub fn draw(&self, image: &DynamicImage, detections: &[Detection], drone_id: u32) -> RgbImage {
        let mut canvas = image.to_rgb8();

        let (width, height) = canvas.dimensions();
        let bound_x = |v: i32| v.clamp(-OFFSCREEN_MARGIN, width as i32 + OFFSCREEN_MARGIN);
        let bound_y = |v: i32| v.clamp(-OFFSCREEN_MARGIN, height as i32 + OFFSCREEN_MARGIN);

        for detection in detections {
            let (x1, y1, x2, y2) = detection.bbox.to_pixels();
            let (x1, y1, x2, y2) = (bound_x(x1), bound_y(y1), bound_x(x2), bound_y(y2));

            for inset in 0..BOX_THICKNESS as i32 {
                let width = (x2 - x1 - 2 * inset + 1).max(1) as u32;
                let height = (y2 - y1 - 2 * inset + 1).max(1) as u32;
                let rect = Rect::at(x1 + inset, y1 + inset).of_size(width, height);
                draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            }

            let (cx, cy) = detection.bbox.center();
            draw_filled_circle_mut(&mut canvas, (bound_x(cx), bound_y(cy)), CENTER_RADIUS, CENTER_COLOR);

            if let Some(font) = &self.font {
                let text = format!("{} {:.2}", detection.label, detection.confidence);
                let scale = PxScale::from(LABEL_SCALE);
                let (_, text_height) = text_size(scale, font, &text);
                let y = y1 - LABEL_OFFSET - text_height as i32;
                draw_text_mut(&mut canvas, BOX_COLOR, x1, y, scale, font, &text);
            }
        }

        if let Some(font) = &self.font {
            let text = format!("Drone ID: {}", drone_id);
            let scale = PxScale::from(BANNER_SCALE);
            let (_, text_height) = text_size(scale, font, &text);
            draw_text_mut(&mut canvas, BANNER_COLOR, 10, 30 - text_height as i32, scale, font, &text);
        }

        canvas
    }

    /// `<dir of source>/<subdir>/<stem>_detected.png`
    pub fn output_path(&self, source: &Path) -> PathBuf {
        let dir = source.parent().unwrap_or_else(|| Path::new("."));
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        dir.join(&self.output_subdir)
            .join(format!("{}_detected.png", stem))
    }

    pub fn save(&self, annotated: &RgbImage, source: &Path) -> WatchResult<PathBuf> {
        let output_path = self.output_path(source);
        if let Some(dir) = output_path.parent() {
            fs::create_dir_all(dir)?;
        }
        annotated.save_with_format(&output_path, image::ImageFormat::Png)?;
        info!("Saved annotated image: {}", output_path.display());
        Ok(output_path)
    }
}
