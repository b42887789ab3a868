use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::detection::draw::Draw;
use crate::detection::prediction::Prediction;

pub const ANNOTATED_FILENAME: &str = "annotated.jpg";
pub const JPEG_QUALITY: u8 = 92;

#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to encode annotated image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Asset id cannot be used as a directory name: {0}")]
    InvalidAssetId(String),
}

/// Writes `<output_dir>/<asset_id>/annotated.jpg`, replacing any earlier rendering.
pub struct Annotator {
    output_dir: PathBuf,
    draw: Draw,
}

impl Annotator {
    pub fn new(output_dir: impl Into<PathBuf>, draw: Draw) -> Self {
        Self {
            output_dir: output_dir.into(),
            draw,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn annotated_path(&self, asset_id: &str) -> Result<PathBuf, AnnotateError> {
        if asset_id.is_empty()
            || asset_id == "."
            || asset_id == ".."
            || asset_id.contains(['/', '\\', '\0'])
        {
            return Err(AnnotateError::InvalidAssetId(asset_id.to_string()));
        }
        Ok(self.output_dir.join(asset_id).join(ANNOTATED_FILENAME))
    }

    pub fn save_annotated_image(
        &self,
        asset_id: &str,
        image: &DynamicImage,
        prediction: &Prediction,
    ) -> Result<PathBuf, AnnotateError> {
        let out_path = self.annotated_path(asset_id)?;
        let io_err = |path: &Path| {
            let path = path.display().to_string();
            move |source| AnnotateError::Io { path, source }
        };

        if let Some(out_dir) = out_path.parent() {
            std::fs::create_dir_all(out_dir).map_err(io_err(out_dir))?;
        }

        let plotted = prediction.plot(image, &self.draw);

        let file = File::create(&out_path).map_err(io_err(&out_path))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(&plotted)?;
        writer.flush().map_err(io_err(&out_path))?;

        Ok(out_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::prediction::{coco_names, Boxes};
    use image::{GenericImageView, RgbImage};

    fn prediction(boxes: Boxes) -> Prediction {
        Prediction {
            names: coco_names(),
            orig_shape: [32, 48],
            boxes: Some(boxes),
        }
    }

    #[test]
    fn writes_jpeg_under_asset_directory() {
        let dir = tempfile::tempdir().unwrap();
        let annotator = Annotator::new(dir.path(), Draw::default());
        let image = DynamicImage::ImageRgb8(RgbImage::new(48, 32));
        let mut boxes = Boxes::default();
        boxes.push([4.0, 4.0, 20.0, 20.0], 0.8, 2.0);

        let path = annotator
            .save_annotated_image("asset-1", &image, &prediction(boxes))
            .unwrap();

        assert_eq!(path, dir.path().join("asset-1").join("annotated.jpg"));
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.dimensions(), (48, 32));
    }

    #[test]
    fn repeated_calls_overwrite_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let annotator = Annotator::new(dir.path(), Draw::default());
        let image = DynamicImage::ImageRgb8(RgbImage::new(16, 16));

        let first = annotator
            .save_annotated_image("a", &image, &prediction(Boxes::default()))
            .unwrap();
        let second = annotator
            .save_annotated_image("a", &image, &prediction(Boxes::default()))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(dir.path().join("a")).unwrap().count(), 1);
    }

    #[test]
    fn path_like_asset_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let annotator = Annotator::new(dir.path(), Draw::default());
        for bad in ["", "..", "../x", "a/b"] {
            assert!(matches!(
                annotator.annotated_path(bad),
                Err(AnnotateError::InvalidAssetId(_))
            ));
        }
    }

    #[test]
    fn unwritable_output_root_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let annotator = Annotator::new(&blocker, Draw::default());
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));

        let err = annotator
            .save_annotated_image("a", &image, &prediction(Boxes::default()))
            .unwrap_err();
        assert!(matches!(err, AnnotateError::Io { .. }));
    }
}
