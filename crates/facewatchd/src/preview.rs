//! Headless "display": the last annotated frame, written to disk as JPEG.

use facewatch_core::{AnnotateError, BoxAnnotator, FaceOutcome, FrameAnnotator};
use image::{ImageFormat, RgbImage};
use std::path::PathBuf;

/// Draws boxes with [`BoxAnnotator`] and, when a preview path is set,
/// replaces that file with the annotated frame.
pub struct PreviewAnnotator {
    boxes: BoxAnnotator,
    path: Option<PathBuf>,
}

impl PreviewAnnotator {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            boxes: BoxAnnotator::new(),
            path,
        }
    }

    fn write_preview(&self, frame: &RgbImage) -> Result<(), AnnotateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AnnotateError::Output(format!("{}: {e}", parent.display())))?;
        }
        // Readers never see a half-written JPEG.
        let tmp = path.with_extension("tmp");
        frame.save_with_format(&tmp, ImageFormat::Jpeg)?;
        std::fs::rename(&tmp, path)
            .map_err(|e| AnnotateError::Output(format!("{}: {e}", path.display())))?;
        Ok(())
    }
}

impl FrameAnnotator for PreviewAnnotator {
    fn annotate(&mut self, frame: &mut RgbImage, faces: &[FaceOutcome]) -> Result<(), AnnotateError> {
        self.boxes.annotate(frame, faces)?;
        self.write_preview(frame)
    }
}
