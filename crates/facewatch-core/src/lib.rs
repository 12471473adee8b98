//! facewatch-core: match-and-alert pipeline for live face surveillance.
//!
//! Matches detected faces against a small gallery of known identities,
//! suppresses repeat alerts per identity within a cooldown window, and
//! appends an audit record for every accepted match. Detection and
//! embedding run behind the [`FaceEmbedder`] boundary; the bundled
//! implementation uses SCRFD and ArcFace via ONNX Runtime.

pub mod alert;
pub mod alignment;
pub mod annotate;
pub mod cooldown;
pub mod detector;
pub mod embedder;
pub mod gallery;
pub mod matcher;
pub mod paths;
pub mod pipeline;
pub mod recognizer;
pub mod recorder;
pub mod source;
pub mod surveillance;
pub mod types;

pub use alert::{AlertError, AlertSink};
pub use annotate::{AnnotateError, BoxAnnotator, FrameAnnotator};
pub use cooldown::{CooldownTracker, SharedCooldown, DEFAULT_COOLDOWN_SECS};
pub use embedder::{EmbedderError, FaceEmbedder, OnnxEmbedder};
pub use gallery::{Gallery, GalleryEntry, GalleryError, GalleryManifest, GallerySource};
pub use matcher::{EuclideanMatcher, Matcher, ACCEPT_THRESHOLD};
pub use pipeline::{Clock, FrameReport, Pipeline, SystemClock};
pub use recorder::{read_events, AlertEvent, CsvEventRecorder, EventRecorder, RecorderError};
pub use source::{FrameSource, SourceError, SourceOpener};
pub use surveillance::{LoopError, LoopState, LoopStatus, SurveillanceLoop};
pub use types::{Decision, DetectedFace, Embedding, FaceOutcome, FaceRegion, MatchResult, UNKNOWN_IDENTITY};
