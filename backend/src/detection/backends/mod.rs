pub mod onnx;
pub mod stub;
pub mod torch;

use std::sync::Arc;

use crate::config::{ModelBackend, Settings};
use crate::detection::prediction::{coco_names, load_class_names, ClassNames, Detector, InferenceError};
use crate::detection::yolo::YoloConfig;

#[cfg_attr(all(feature = "backend-onnx", feature = "backend-torch"), allow(dead_code))]
fn unavailable(backend: ModelBackend, feature: &str) -> InferenceError {
    InferenceError::Unavailable(format!("{} (rebuild with the {} feature)", backend, feature))
}

#[cfg_attr(not(any(feature = "backend-onnx", feature = "backend-torch")), allow(dead_code))]
fn class_names(settings: &Settings) -> Result<ClassNames, InferenceError> {
    match &settings.labels_path {
        Some(path) => load_class_names(path).map_err(|e| {
            InferenceError::Load(format!("failed to read labels {}: {}", path.display(), e))
        }),
        None => Ok(coco_names()),
    }
}

#[cfg_attr(not(any(feature = "backend-onnx", feature = "backend-torch")), allow(dead_code))]
fn yolo_config(settings: &Settings) -> YoloConfig {
    YoloConfig {
        confidence_threshold: settings.confidence_threshold,
        iou_threshold: settings.iou_threshold,
        ..YoloConfig::default()
    }
}

/// Builds the process-wide model handle selected by `model_backend`.
pub fn load_detector(settings: &Settings) -> Result<Arc<dyn Detector>, InferenceError> {
    match settings.model_backend {
        ModelBackend::Stub => {
            log::warn!("Using stub detector, predictions are canned");
            Ok(Arc::new(stub::StubDetector))
        }
        #[cfg(feature = "backend-onnx")]
        ModelBackend::Onnx => Ok(Arc::new(onnx::OnnxYoloDetector::load(
            &settings.resolved_model_path(),
            class_names(settings)?,
            yolo_config(settings),
        )?)),
        #[cfg(feature = "backend-torch")]
        ModelBackend::Torchscript => Ok(Arc::new(torch::TorchYoloDetector::load(
            &settings.resolved_model_path(),
            class_names(settings)?,
            yolo_config(settings),
        )?)),
        #[cfg(not(feature = "backend-onnx"))]
        ModelBackend::Onnx => Err(unavailable(ModelBackend::Onnx, "backend-onnx")),
        #[cfg(not(feature = "backend-torch"))]
        ModelBackend::Torchscript => Err(unavailable(ModelBackend::Torchscript, "backend-torch")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_needs_no_weights() {
        let settings = Settings {
            model_backend: ModelBackend::Stub,
            ..Settings::default()
        };
        let detector = load_detector(&settings).unwrap();
        assert_eq!(detector.model_name(), "stub");
    }

    #[test]
    fn missing_labels_file_fails_to_load() {
        let settings = Settings {
            labels_path: Some("/nonexistent/labels.txt".into()),
            ..Settings::default()
        };
        assert!(matches!(class_names(&settings), Err(InferenceError::Load(_))));
    }

    #[cfg(feature = "backend-onnx")]
    #[test]
    fn missing_onnx_weights_fail_to_load() {
        let settings = Settings {
            model_backend: ModelBackend::Onnx,
            model_path: Some("/nonexistent/yolov8n.onnx".into()),
            ..Settings::default()
        };
        assert!(matches!(load_detector(&settings), Err(InferenceError::Load(_))));
    }
}
