use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::Path;

/// COCO class names, in YOLOv8 class-index order.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Unexpected model output: {0}")]
    Output(String),
    #[error("Inference failed: {0}")]
    Backend(String),
    #[error("Model backend not available: {0}")]
    Unavailable(String),
}

pub type ClassNames = BTreeMap<u32, String>;

pub fn coco_names() -> ClassNames {
    COCO_CLASSES
        .iter()
        .enumerate()
        .map(|(i, name)| (i as u32, name.to_string()))
        .collect()
}

/// One class name per line; blank lines are skipped without consuming an index.
pub fn load_class_names(path: &Path) -> std::io::Result<ClassNames> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, name)| (i as u32, name.to_string()))
        .collect())
}

/// Box columns for one image, stored as the model emits them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Boxes {
    pub xyxy: Vec<[f32; 4]>,
    pub conf: Vec<f32>,
    pub cls: Vec<f32>,
}

impl Boxes {
    pub fn push(&mut self, xyxy: [f32; 4], conf: f32, cls: f32) {
        self.xyxy.push(xyxy);
        self.conf.push(conf);
        self.cls.push(cls);
    }

    pub fn len(&self) -> usize {
        self.xyxy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xyxy.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[f32; 4], f32, f32)> + '_ {
        self.xyxy
            .iter()
            .zip(self.conf.iter().copied())
            .zip(self.cls.iter().copied())
            .map(|((xyxy, conf), cls)| (xyxy, conf, cls))
    }
}

/// Raw per-image result of a detector, before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub names: ClassNames,
    /// `[height, width]` of the source image.
    pub orig_shape: [u32; 2],
    pub boxes: Option<Boxes>,
}

impl Prediction {
    pub fn label_for(&self, class_id: u32) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }
}

/// A pretrained detection model. Implementations are shared across workers.
pub trait Detector: Send + Sync {
    fn model_name(&self) -> &str;

    fn predict(&self, image: &DynamicImage) -> Result<Prediction, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_falls_back_to_class_id() {
        let prediction = Prediction {
            names: coco_names(),
            orig_shape: [10, 10],
            boxes: None,
        };
        assert_eq!(prediction.label_for(0), "person");
        assert_eq!(prediction.label_for(79), "toothbrush");
        assert_eq!(prediction.label_for(123), "123");
    }

    #[test]
    fn class_names_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "cat\n\n dog \nbird\n").unwrap();

        let names = load_class_names(&path).unwrap();

        assert_eq!(names.len(), 3);
        assert_eq!(names[&0], "cat");
        assert_eq!(names[&1], "dog");
        assert_eq!(names[&2], "bird");
    }

    #[test]
    fn boxes_iterate_column_wise() {
        let mut boxes = Boxes::default();
        boxes.push([1.0, 2.0, 3.0, 4.0], 0.5, 2.0);
        boxes.push([5.0, 6.0, 7.0, 8.0], 0.25, 0.0);

        let rows: Vec<_> = boxes.iter().collect();
        assert_eq!(boxes.len(), 2);
        assert_eq!(rows[0], (&[1.0, 2.0, 3.0, 4.0], 0.5, 2.0));
        assert_eq!(rows[1], (&[5.0, 6.0, 7.0, 8.0], 0.25, 0.0));
    }
}
