use serde::{Deserialize, Serialize};

/// Identity reported for faces that resolve to no gallery entry.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Face region in pixel coordinates, `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Embeddings of different dimension are never close: the distance is
    /// `+inf` rather than a silently truncated comparison.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in a frame, with its embedding. Lives for one frame.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub region: FaceRegion,
    pub embedding: Embedding,
}

/// Outcome of matching one probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Matched identity, or [`UNKNOWN_IDENTITY`].
    pub identity: String,
    /// Confidence percentage in `[0, 100]`; `0` for unknown faces.
    pub confidence: f32,
    /// Distance to the nearest gallery entry (`+inf` for an empty gallery).
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            identity: UNKNOWN_IDENTITY.to_string(),
            confidence: 0.0,
            distance,
        }
    }

    pub fn is_known(&self) -> bool {
        self.identity != UNKNOWN_IDENTITY
    }

    /// Display label, e.g. `"Alice (70.00%)"`.
    pub fn label(&self) -> String {
        format!("{} ({:.2}%)", self.identity, self.confidence)
    }
}

/// What the loop did with one detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Known identity outside its cooldown window: recorded and alerted.
    Accepted,
    /// Known identity still inside its cooldown window.
    Suppressed,
    /// No gallery entry within the acceptance threshold.
    Unknown,
}

/// Per-face result of one frame's evaluation, handed to the annotator.
#[derive(Debug, Clone, Serialize)]
pub struct FaceOutcome {
    pub region: FaceRegion,
    pub result: MatchResult,
    pub decision: Decision,
}
