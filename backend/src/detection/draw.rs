use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

use crate::detection::prediction::Prediction;

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_PADDING: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("Failed to read font {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid font file {0}")]
    Invalid(String),
}

/// Box and label renderer. Without a font only the boxes are drawn.
#[derive(Default)]
pub struct Draw {
    font: Option<FontVec>,
}

impl Draw {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    pub fn from_font_path(path: Option<&Path>) -> Result<Self, FontError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = std::fs::read(path).map_err(|source| FontError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontVec::try_from_vec(data)
            .map_err(|_| FontError::Invalid(path.display().to_string()))?;
        Ok(Self::new(Some(font)))
    }

    pub fn color(class_id: u32) -> Rgb<u8> {
        Rgb(PALETTE[class_id as usize % PALETTE.len()])
    }

    pub fn line_width(width: u32, height: u32) -> u32 {
        (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(2)
    }

    pub fn draw_box_with_label(
        &self,
        image: &mut RgbImage,
        bbox: &[f32; 4],
        label: &str,
        color: Rgb<u8>,
    ) {
        let (w, h) = (image.width() as i32, image.height() as i32);
        if w == 0 || h == 0 {
            return;
        }
        let x_min = (bbox[0].min(bbox[2]).floor() as i32).clamp(0, w - 1);
        let y_min = (bbox[1].min(bbox[3]).floor() as i32).clamp(0, h - 1);
        let x_max = (bbox[0].max(bbox[2]).ceil() as i32).clamp(0, w - 1);
        let y_max = (bbox[1].max(bbox[3]).ceil() as i32).clamp(0, h - 1);

        let line_width = Self::line_width(image.width(), image.height()) as i32;
        for t in 0..line_width {
            let rw = x_max - x_min + 1 - 2 * t;
            let rh = y_max - y_min + 1 - 2 * t;
            if rw <= 0 || rh <= 0 {
                break;
            }
            let rect = Rect::at(x_min + t, y_min + t).of_size(rw as u32, rh as u32);
            draw_hollow_rect_mut(image, rect, color);
        }

        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from((line_width * 6).max(12) as f32);
        let (text_w, text_h) = text_size(scale, font, label);
        if text_w == 0 || text_h == 0 {
            return;
        }
        let strip_h = text_h as i32 + 2 * LABEL_PADDING;
        // above the box when there is room, otherwise just inside it
        let label_y = if y_min >= strip_h { y_min - strip_h } else { y_min };
        let strip_w = (text_w as i32 + 2 * LABEL_PADDING).min(w - x_min);
        if strip_w <= 0 {
            return;
        }
        let rect = Rect::at(x_min, label_y).of_size(strip_w as u32, strip_h as u32);
        draw_filled_rect_mut(image, rect, color);
        draw_text_mut(
            image,
            TEXT_COLOR,
            x_min + LABEL_PADDING,
            label_y + LABEL_PADDING,
            scale,
            font,
            label,
        );
    }
}

impl Prediction {
    /// Renders every box onto a copy of `image`, labelled `"<name> <conf>"`.
    pub fn plot(&self, image: &DynamicImage, draw: &Draw) -> RgbImage {
        let mut canvas = image.to_rgb8();
        if let Some(boxes) = &self.boxes {
            for (xyxy, conf, cls) in boxes.iter() {
                let class_id = cls as u32;
                let label = format!("{} {:.2}", self.label_for(class_id), conf);
                draw.draw_box_with_label(&mut canvas, xyxy, &label, Draw::color(class_id));
            }
        }
        canvas
    }
}
