use image::DynamicImage;
use shared::{Artifacts, DebugDetectResponse, DetectResponse, Detection};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::detection::annotate::{AnnotateError, Annotator};
use crate::detection::prediction::{Boxes, Detector, InferenceError, Prediction};
use crate::request_id::RequestId;

const NAMES_SAMPLE_SIZE: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Annotate(#[from] AnnotateError),
}

/// Runs the shared model over a stored image and reshapes its output into response JSON.
///
/// Every box the model returns is surfaced; no score filtering happens here.
pub struct DetectionAdapter {
    detector: Arc<dyn Detector>,
    annotator: Annotator,
}

impl DetectionAdapter {
    pub fn new(detector: Arc<dyn Detector>, annotator: Annotator) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    pub fn model_name(&self) -> &str {
        self.detector.model_name()
    }

    fn load_and_predict(
        &self,
        request_id: &RequestId,
        image_path: &Path,
    ) -> Result<(DynamicImage, Prediction), DetectError> {
        let image = image::open(image_path).map_err(|source| DetectError::Decode {
            path: image_path.display().to_string(),
            source,
        })?;
        let prediction = self.detector.predict(&image).map_err(|e| {
            log::error!(request_id = request_id.as_str(); "Model inference error: {}", e);
            e
        })?;
        Ok((image, prediction))
    }

    pub fn detect(
        &self,
        request_id: &RequestId,
        image_path: &Path,
        asset_id: &str,
    ) -> Result<DetectResponse, DetectError> {
        let started = Instant::now();

        let (image, prediction) = self.load_and_predict(request_id, image_path)?;
        let detections = normalize(&prediction);
        let annotated_path = self
            .annotator
            .save_annotated_image(asset_id, &image, &prediction)?;

        let latency_ms = started.elapsed().as_millis() as u64;
        log::info!(
            request_id = request_id.as_str(), asset_id = asset_id, latency_ms = latency_ms;
            "Detected {} objects with {}",
            detections.len(),
            self.model_name()
        );

        Ok(DetectResponse {
            asset_id: asset_id.to_string(),
            detections,
            model: self.model_name().to_string(),
            latency_ms,
            artifacts: Artifacts {
                annotated_image_path: annotated_path.display().to_string(),
            },
        })
    }

    pub fn debug_detect(
        &self,
        request_id: &RequestId,
        image_path: &Path,
        asset_id: &str,
    ) -> Result<DebugDetectResponse, DetectError> {
        let started = Instant::now();

        let (image, prediction) = self.load_and_predict(request_id, image_path)?;
        self.annotator
            .save_annotated_image(asset_id, &image, &prediction)?;

        let boxes = prediction.boxes.as_ref();
        let names_sample = (!prediction.names.is_empty()).then(|| {
            prediction
                .names
                .iter()
                .take(NAMES_SAMPLE_SIZE)
                .map(|(id, name)| (*id, name.clone()))
                .collect()
        });

        let latency_ms = started.elapsed().as_millis() as u64;
        log::info!(
            request_id = request_id.as_str(), asset_id = asset_id, latency_ms = latency_ms;
            "Debug detection finished"
        );

        Ok(DebugDetectResponse {
            asset_id: asset_id.to_string(),
            result_type: std::any::type_name::<Prediction>().to_string(),
            orig_shape: Some(prediction.orig_shape.to_vec()),
            names_sample,
            has_boxes: boxes.is_some(),
            boxes_type: boxes.map(|_| std::any::type_name::<Boxes>().to_string()),
            num_boxes: boxes.map_or(0, Boxes::len),
            boxes_xyxy: boxes
                .map(|b| b.xyxy.iter().map(|row| row.to_vec()).collect())
                .unwrap_or_default(),
            boxes_conf: boxes.map(|b| b.conf.clone()).unwrap_or_default(),
            boxes_cls: boxes.map(|b| b.cls.clone()).unwrap_or_default(),
            latency_ms,
            model: self.model_name().to_string(),
        })
    }
}

/// Label lookup with id fallback, float score, box coordinates truncated toward zero.
pub fn normalize(prediction: &Prediction) -> Vec<Detection> {
    let Some(boxes) = prediction.boxes.as_ref().filter(|b| !b.is_empty()) else {
        return Vec::new();
    };
    boxes
        .iter()
        .map(|(xyxy, conf, cls)| Detection {
            label: prediction.label_for(cls as u32),
            score: conf as f64,
            bbox: [
                xyxy[0] as i32,
                xyxy[1] as i32,
                xyxy[2] as i32,
                xyxy[3] as i32,
            ],
        })
        .collect()
}
