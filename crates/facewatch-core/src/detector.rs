//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the RGB frame into the 640×640 model input, decodes the three
//! anchor strides and applies non-maximum suppression.

use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (download it from insightface into the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face found by the detector, in frame pixel coordinates.
#[derive(Debug, Clone)]
pub struct Detection {
    pub region: FaceRegion,
    pub score: f32,
    /// Left eye, right eye, nose, left mouth corner, right mouth corner.
    pub landmarks: [(f32, f32); 5],
}

/// Raw decoded box in frame coordinates, before clamping.
#[derive(Debug, Clone)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    landmarks: [(f32, f32); 5],
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    fn into_detection(self, width: u32, height: u32) -> Detection {
        let clamp_x = |v: f32| v.round().clamp(0.0, width.saturating_sub(1) as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, height.saturating_sub(1) as f32) as u32;
        Detection {
            region: FaceRegion {
                top: clamp_y(self.y1),
                right: clamp_x(self.x2),
                bottom: clamp_y(self.y2),
                left: clamp_x(self.x1),
            },
            score: self.score,
            landmarks: self.landmarks,
        }
    }
}

/// Scale and padding applied when letterboxing into the model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> (Self, u32, u32) {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, target);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, target);
        let lb = Self {
            scale,
            pad_x: (target - new_w) / 2,
            pad_y: (target - new_h) / 2,
        };
        (lb, new_w, new_h)
    }

    /// Map a point from model-input space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Output tensor indices for one stride: (score, bbox, kps).
type StrideOutputs = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    stride_outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(path = model_path, outputs = ?output_names, "loaded SCRFD model");

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs 9 outputs (score/bbox/kps for 3 strides), got {}",
                output_names.len()
            )));
        }

        Ok(Self {
            session,
            stride_outputs: map_outputs(&output_names),
        })
    }

    /// Detect faces in an RGB frame, highest score first.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(frame);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_outputs[pos];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("landmarks stride {stride}: {e}")))?;

            candidates.extend(decode_stride(scores, bboxes, kps, stride, &letterbox));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD)
            .into_iter()
            .map(|c| c.into_detection(width, height))
            .collect())
    }
}

/// Letterbox the frame into a normalized NCHW RGB tensor.
fn preprocess(frame: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (lb, new_w, new_h) = Letterbox::fit(frame.width(), frame.height(), SCRFD_INPUT_SIZE);
    let resized = imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    // Zero is the normalized padding value.
    let size = SCRFD_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = ((x + lb.pad_x) as usize, (y + lb.pad_y) as usize);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, lb)
}

/// Resolve which output tensor holds which stride.
///
/// Exports name their outputs either `score_8`, `bbox_8`, `kps_8`, ... or
/// with opaque numbers; the latter use the standard positional layout
/// (scores 0-2, bboxes 3-5, landmarks 6-8).
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?, find("kps", s)?)))
        .collect();

    match named.as_deref() {
        Some(&[s8, s16, s32]) => [s8, s16, s32],
        _ => {
            tracing::debug!(?names, "SCRFD outputs unnamed, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Decode one stride's anchors into frame-space candidates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<Candidate> {
    let grid_w = SCRFD_INPUT_SIZE as usize / stride;
    let grid_h = SCRFD_INPUT_SIZE as usize / stride;
    let step = stride as f32;

    let mut out = Vec::new();
    for idx in 0..grid_w * grid_h * SCRFD_ANCHORS_PER_CELL {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= SCRFD_CONFIDENCE_THRESHOLD {
            continue;
        }
        let (Some(b), Some(k)) = (bboxes.get(idx * 4..idx * 4 + 4), kps.get(idx * 10..idx * 10 + 10))
        else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let ax = (cell % grid_w) as f32 * step;
        let ay = (cell / grid_w) as f32 * step;

        let (x1, y1) = letterbox.unmap(ax - b[0] * step, ay - b[1] * step);
        let (x2, y2) = letterbox.unmap(ax + b[2] * step, ay + b[3] * step);
        let landmarks =
            std::array::from_fn(|i| letterbox.unmap(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step));

        out.push(Candidate { x1, y1, x2, y2, score, landmarks });
    }
    out
}

/// Greedy non-maximum suppression; result is sorted by descending score.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for cand in candidates {
        if keep.iter().all(|k| k.iou(&cand) <= iou_threshold) {
            keep.push(cand);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(x: f32, y: f32, w: f32, h: f32, score: f32) -> Candidate {
        Candidate { x1: x, y1: y, x2: x + w, y2: y + h, score, landmarks: [(0.0, 0.0); 5] }
    }

    #[test]
    fn test_iou() {
        let a = cand(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!(a.iou(&cand(20.0, 20.0, 10.0, 10.0, 1.0)).abs() < 1e-6);
        // Overlap 5x10 = 50, union 150.
        let b = cand(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let result = nms(
            vec![
                cand(5.0, 5.0, 100.0, 100.0, 0.8),
                cand(0.0, 0.0, 100.0, 100.0, 0.9),
                cand(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        let scores: Vec<f32> = result.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(Vec::new(), 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_unmap() {
        let (lb, new_w, new_h) = Letterbox::fit(320, 240, 640);
        assert_eq!((new_w, new_h), (640, 480));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 80));

        let (x, y) = lb.unmap(100.0 * lb.scale + lb.pad_x as f32, 50.0 * lb.scale + lb.pad_y as f32);
        assert!((x - 100.0).abs() < 0.1 && (y - 50.0).abs() < 0.1, "({x}, {y})");
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let frame = RgbImage::from_pixel(320, 240, image::Rgb([255, 255, 255]));
        let (tensor, lb) = preprocess(&frame);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let inside = tensor[[0, 1, lb.pad_y as usize + 10, 10]];
        assert!((inside - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-4);
    }

    #[test]
    fn test_map_outputs_named_shuffled() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(map_outputs(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_map_outputs_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| (440 + i).to_string()).collect();
        assert_eq!(map_outputs(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_decode_stride_single_anchor() {
        let lb = Letterbox { scale: 1.0, pad_x: 0, pad_y: 0 };
        let stride = 32;
        let cells = (640 / stride) * (640 / stride) * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0; cells];
        // Anchor 2 → cell 1 → grid (1, 0) → centre (32, 0).
        scores[2] = 0.95;
        let bboxes = vec![1.0; cells * 4];
        let kps = vec![0.0; cells * 10];

        let out = decode_stride(&scores, &bboxes, &kps, stride, &lb);
        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!((c.x1, c.y1, c.x2, c.y2), (0.0, -32.0, 64.0, 32.0));
        assert_eq!(c.landmarks[0], (32.0, 0.0));
    }

    #[test]
    fn test_detection_region_clamped() {
        let d = cand(-10.0, -5.0, 700.0, 100.0, 0.9).into_detection(640, 480);
        assert_eq!(d.region, FaceRegion { top: 0, right: 639, bottom: 95, left: 0 });
    }
}
