#![cfg(feature = "backend-onnx")]

use image::{DynamicImage, GenericImageView};
use std::path::Path;
use tract_onnx::prelude::*;

use crate::detection::prediction::{ClassNames, Detector, InferenceError, Prediction};
use crate::detection::yolo::{self, YoloConfig, INPUT_SIZE};

/// YOLOv8 exported to ONNX, run with tract.
///
/// The plan is built once at startup; `run` takes `&self`, so one instance serves every
/// worker without locking.
pub struct OnnxYoloDetector {
    model: TypedRunnableModel<TypedModel>,
    names: ClassNames,
    config: YoloConfig,
}

impl OnnxYoloDetector {
    pub fn load(
        model_path: &Path,
        names: ClassNames,
        config: YoloConfig,
    ) -> Result<Self, InferenceError> {
        log::info!("Loading ONNX model from {}", model_path.display());
        let size = INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| {
                InferenceError::Load(format!("{}: {}", model_path.display(), e))
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .map_err(|e| InferenceError::Load(format!("failed to set input fact: {}", e)))?
            .into_optimized()
            .map_err(|e| InferenceError::Load(format!("failed to optimize model: {}", e)))?
            .into_runnable()
            .map_err(|e| InferenceError::Load(format!("failed to build runnable model: {}", e)))?;
        log::info!("ONNX model ready ({} class names)", names.len());

        Ok(Self {
            model,
            names,
            config,
        })
    }
}

impl Detector for OnnxYoloDetector {
    fn model_name(&self) -> &str {
        "yolov8"
    }

    fn predict(&self, image: &DynamicImage) -> Result<Prediction, InferenceError> {
        let (width, height) = image.dimensions();
        let (input, letterbox) = yolo::preprocess(image, INPUT_SIZE);
        let input_data = input
            .as_slice()
            .ok_or_else(|| InferenceError::Backend("input tensor is not contiguous".to_string()))?;
        let tensor = Tensor::from_shape(input.shape(), input_data)
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Backend(format!("ONNX inference failed: {}", e)))?;
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::Output("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Output(format!("output tensor was not f32: {}", e)))?;
        let shape = view.shape().to_vec();
        let data: Vec<f32> = view.iter().copied().collect();

        let boxes = yolo::postprocess(&data, &shape, &letterbox, &self.config)?;
        Ok(Prediction {
            names: self.names.clone(),
            orig_shape: [height, width],
            boxes: Some(boxes),
        })
    }
}
