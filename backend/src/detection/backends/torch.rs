#![cfg(feature = "backend-torch")]

use image::{DynamicImage, GenericImageView};
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use crate::detection::prediction::{ClassNames, Detector, InferenceError, Prediction};
use crate::detection::yolo::{self, YoloConfig, INPUT_SIZE};

impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Backend(err.to_string())
    }
}

/// YOLOv8 exported to TorchScript. The module is not shared across threads without a lock.
pub struct TorchYoloDetector {
    model: Mutex<CModule>,
    device: Device,
    names: ClassNames,
    config: YoloConfig,
}

impl TorchYoloDetector {
    pub fn load(
        model_path: &Path,
        names: ClassNames,
        config: YoloConfig,
    ) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        log::info!(
            "Loading TorchScript model from {} on {:?}",
            model_path.display(),
            device
        );
        let mut model = CModule::load_on_device(model_path, device)
            .map_err(|e| InferenceError::Load(format!("{}: {}", model_path.display(), e)))?;
        model.set_eval();

        Ok(Self {
            model: Mutex::new(model),
            device,
            names,
            config,
        })
    }
}

impl Detector for TorchYoloDetector {
    fn model_name(&self) -> &str {
        "yolov8"
    }

    fn predict(&self, image: &DynamicImage) -> Result<Prediction, InferenceError> {
        let (width, height) = image.dimensions();
        let (input, letterbox) = yolo::preprocess(image, INPUT_SIZE);
        let input_data = input
            .as_slice()
            .ok_or_else(|| InferenceError::Backend("input tensor is not contiguous".to_string()))?;
        let size = INPUT_SIZE as i64;
        let tensor = Tensor::from_slice(input_data)
            .view([1, 3, size, size])
            .to_device(self.device);

        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Backend("model lock poisoned".to_string()))?;
            tch::no_grad(|| model.forward_ts(&[tensor]))?
        };

        let output = output.to_kind(Kind::Float).to_device(Device::Cpu);
        let shape: Vec<usize> = output.size().iter().map(|&d| d as usize).collect();
        let output_flat = output.view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        let mut data = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut data, num_elements);

        let boxes = yolo::postprocess(&data, &shape, &letterbox, &self.config)?;
        Ok(Prediction {
            names: self.names.clone(),
            orig_shape: [height, width],
            boxes: Some(boxes),
        })
    }
}
