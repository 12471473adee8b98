//! The face detection + embedding capability boundary.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::DetectedFace;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("embedding failed: {0}")]
    Failed(String),
}

/// Finds faces in a frame and embeds each one.
///
/// Implementations keep no per-frame state between calls.
pub trait FaceEmbedder {
    fn detect_and_embed(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, EmbedderError>;
}

/// SCRFD detection followed by ArcFace embedding of every detected face.
pub struct OnnxEmbedder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEmbedder {
    pub const DETECTOR_MODEL: &'static str = "det_10g.onnx";
    pub const RECOGNIZER_MODEL: &'static str = "w600k_r50.onnx";

    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load both models from `model_dir` using their standard file names.
    pub fn load(model_dir: &Path) -> Result<Self, EmbedderError> {
        let scrfd = model_dir.join(Self::DETECTOR_MODEL);
        let arcface = model_dir.join(Self::RECOGNIZER_MODEL);
        let detector = FaceDetector::load(&scrfd.to_string_lossy())?;
        let recognizer = FaceRecognizer::load(&arcface.to_string_lossy())?;
        Ok(Self::new(detector, recognizer))
    }
}

impl FaceEmbedder for OnnxEmbedder {
    fn detect_and_embed(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, EmbedderError> {
        let detections = self.detector.detect(frame)?;
        let mut faces = Vec::with_capacity(detections.len());
        for det in detections {
            let embedding = self.recognizer.extract(frame, &det.landmarks)?;
            faces.push(DetectedFace {
                region: det.region,
                embedding,
            });
        }
        Ok(faces)
    }
}
