use image::{DynamicImage, GenericImageView};
use std::collections::BTreeMap;

use crate::detection::prediction::{Boxes, Detector, InferenceError, Prediction};

/// Relative `[x1, y1, x2, y2]` of the single box the stub reports.
const STUB_BOX: [f32; 4] = [0.1, 0.1, 0.4, 0.6];
const STUB_SCORE: f32 = 0.9;

/// Stand-in model that reports one "person" for every image. Needs no weights.
#[derive(Debug, Default, Clone)]
pub struct StubDetector;

impl Detector for StubDetector {
    fn model_name(&self) -> &str {
        "stub"
    }

    fn predict(&self, image: &DynamicImage) -> Result<Prediction, InferenceError> {
        let (width, height) = image.dimensions();
        let (w, h) = (width as f32, height as f32);

        let mut boxes = Boxes::default();
        boxes.push(
            [STUB_BOX[0] * w, STUB_BOX[1] * h, STUB_BOX[2] * w, STUB_BOX[3] * h],
            STUB_SCORE,
            0.0,
        );

        Ok(Prediction {
            names: BTreeMap::from([(0, "person".to_string())]),
            orig_shape: [height, width],
            boxes: Some(boxes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn reports_one_person_scaled_to_the_image() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let prediction = StubDetector.predict(&image).unwrap();

        let boxes = prediction.boxes.unwrap();
        assert_eq!(prediction.orig_shape, [100, 200]);
        assert_eq!(boxes.len(), 1);
        for (got, want) in boxes.xyxy[0].iter().zip([20.0, 10.0, 80.0, 60.0]) {
            assert!((got - want).abs() < 1e-3, "{} != {}", got, want);
        }
        assert_eq!(prediction.names[&0], "person");
    }
}
