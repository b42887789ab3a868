//! YOLOv8 pre- and post-processing shared by the ONNX and TorchScript backends.
//!
//! Input is a letterboxed `1x3x640x640` RGB tensor scaled to `[0, 1]`. Output is
//! `[1, 4 + nc, N]`: box centre/size rows followed by one score row per class.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{Array4, ArrayView2, Axis};

use crate::detection::prediction::{Boxes, InferenceError};

pub const INPUT_SIZE: u32 = 640;
const PAD_VALUE: u8 = 114;
const MAX_NMS_CANDIDATES: usize = 30_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Mapping from letterboxed model coordinates back to source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub gain: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    pub fn new(orig_width: u32, orig_height: u32, size: u32) -> Self {
        let gain = (size as f32 / orig_height as f32).min(size as f32 / orig_width as f32);
        let new_w = (orig_width as f32 * gain).round();
        let new_h = (orig_height as f32 * gain).round();
        let pad_x = ((size as f32 - new_w) / 2.0 - 0.1).round().max(0.0);
        let pad_y = ((size as f32 - new_h) / 2.0 - 0.1).round().max(0.0);
        Self {
            gain,
            pad_x,
            pad_y,
            orig_width,
            orig_height,
        }
    }

    fn resized_dims(&self) -> (u32, u32) {
        (
            ((self.orig_width as f32 * self.gain).round() as u32).max(1),
            ((self.orig_height as f32 * self.gain).round() as u32).max(1),
        )
    }

    pub fn unmap(&self, xyxy: [f32; 4]) -> [f32; 4] {
        let w = self.orig_width as f32;
        let h = self.orig_height as f32;
        [
            ((xyxy[0] - self.pad_x) / self.gain).clamp(0.0, w),
            ((xyxy[1] - self.pad_y) / self.gain).clamp(0.0, h),
            ((xyxy[2] - self.pad_x) / self.gain).clamp(0.0, w),
            ((xyxy[3] - self.pad_y) / self.gain).clamp(0.0, h),
        ]
    }
}

/// Aspect-preserving resize onto a padded square canvas, returned as NCHW floats.
pub fn preprocess(image: &DynamicImage, size: u32) -> (Array4<f32>, Letterbox) {
    let rgb = image.to_rgb8();
    let letterbox = Letterbox::new(rgb.width(), rgb.height(), size);
    let (new_w, new_h) = letterbox.resized_dims();

    let resized = imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
    );

    let size = size as usize;
    let input = Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
        canvas.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
    });
    (input, letterbox)
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    xyxy: [f32; 4],
    score: f32,
    class_id: usize,
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Class-aware greedy NMS. Input must already be sorted by descending score.
fn non_max_suppression(candidates: &[Candidate], iou_threshold: f32, limit: usize) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= limit {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.xyxy, &candidate.xyxy) > iou_threshold
        });
        if !suppressed {
            kept.push(*candidate);
        }
    }
    kept
}

/// Turns a raw `[1, 4 + nc, N]` (or `[4 + nc, N]`) output into boxes in source-image
/// pixels, highest score first.
pub fn postprocess(
    data: &[f32],
    shape: &[usize],
    letterbox: &Letterbox,
    config: &YoloConfig,
) -> Result<Boxes, InferenceError> {
    let dims: Vec<usize> = match shape {
        [1, rows, cols] => vec![*rows, *cols],
        [rows, cols] => vec![*rows, *cols],
        other => {
            return Err(InferenceError::Output(format!(
                "expected [1, 4 + classes, anchors], got {:?}",
                other
            )))
        }
    };
    let view = ArrayView2::from_shape((dims[0], dims[1]), data)
        .map_err(|e| InferenceError::Output(e.to_string()))?;
    if view.nrows() <= 4 {
        return Err(InferenceError::Output(format!(
            "output has {} rows, need at least 5",
            view.nrows()
        )));
    }

    let mut candidates: Vec<Candidate> = view
        .axis_iter(Axis(1))
        .filter_map(|anchor| {
            let (class_id, score) = anchor
                .iter()
                .skip(4)
                .copied()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (i, s)| {
                    if s > best.1 { (i, s) } else { best }
                });
            if score <= config.confidence_threshold {
                return None;
            }
            let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
            Some(Candidate {
                xyxy: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                score,
                class_id,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(MAX_NMS_CANDIDATES);

    let mut boxes = Boxes::default();
    for kept in non_max_suppression(&candidates, config.iou_threshold, config.max_detections) {
        boxes.push(letterbox.unmap(kept.xyxy), kept.score, kept.class_id as f32);
    }
    log::debug!("YOLO postprocess kept {} of {} candidates", boxes.len(), candidates.len());
    Ok(boxes)
}
