//! Per-frame match-and-alert decisions.
//!
//! Pure of camera and display concerns: the pipeline takes a frame and the
//! capabilities it needs, and decides, records and alerts for each face.

use crate::alert::AlertSink;
use crate::annotate::FrameAnnotator;
use crate::cooldown::SharedCooldown;
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::gallery::Gallery;
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::recorder::{AlertEvent, EventRecorder};
use crate::types::{Decision, DetectedFace, FaceOutcome};
use chrono::{DateTime, Local};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("face embedding failed: {0}")]
    Embedder(#[from] EmbedderError),
}

/// Source of "now" for cooldown and audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Decisions for every face in one frame.
#[derive(Debug, Default, Clone)]
pub struct FrameReport {
    pub faces: Vec<FaceOutcome>,
    /// False if the annotator failed on this frame.
    pub annotated: bool,
}

impl FrameReport {
    pub fn count(&self, decision: Decision) -> usize {
        self.faces.iter().filter(|f| f.decision == decision).count()
    }
}

/// Match, cooldown, record and alert, wired to shared collaborators.
pub struct Pipeline {
    gallery: Arc<Gallery>,
    matcher: Box<dyn Matcher + Send + Sync>,
    cooldown: Arc<SharedCooldown>,
    recorder: Arc<dyn EventRecorder>,
    alert: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        gallery: Arc<Gallery>,
        cooldown: Arc<SharedCooldown>,
        recorder: Arc<dyn EventRecorder>,
        alert: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            gallery,
            matcher: Box::new(EuclideanMatcher),
            cooldown,
            recorder,
            alert,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn cooldown(&self) -> &SharedCooldown {
        &self.cooldown
    }

    /// Decide one detected face.
    ///
    /// An accepted identity enters its cooldown before the audit write, and
    /// neither a failed write nor a failed notification undoes that.
    pub fn evaluate(&self, face: &DetectedFace) -> FaceOutcome {
        let result = self.matcher.compare(&face.embedding, &self.gallery);

        let decision = if !result.is_known() {
            Decision::Unknown
        } else {
            let now = self.clock.now();
            if self.cooldown.try_accept(&result.identity, now) {
                let event = AlertEvent::new(result.identity.as_str(), result.confidence, now);
                if let Err(e) = self.recorder.record(&event) {
                    tracing::warn!(identity = %event.identity, error = %e, "failed to record event");
                }
                if let Err(e) = self.alert.notify() {
                    tracing::warn!(error = %e, "alert notification failed");
                }
                tracing::info!(
                    identity = %result.identity,
                    confidence = %format!("{:.2}", result.confidence),
                    "match accepted"
                );
                Decision::Accepted
            } else {
                tracing::debug!(identity = %result.identity, "match suppressed by cooldown");
                Decision::Suppressed
            }
        };

        FaceOutcome {
            region: face.region,
            result,
            decision,
        }
    }

    /// Detect, decide and annotate one frame.
    ///
    /// Annotation failures are logged and reported in the result; only an
    /// embedding failure fails the frame.
    pub fn process_frame(
        &self,
        embedder: &mut dyn FaceEmbedder,
        annotator: &mut dyn FrameAnnotator,
        frame: &mut RgbImage,
    ) -> Result<FrameReport, FrameError> {
        let detected = embedder.detect_and_embed(frame)?;
        let faces: Vec<FaceOutcome> = detected.iter().map(|f| self.evaluate(f)).collect();

        let annotated = match annotator.annotate(frame, &faces) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "frame annotation failed");
                false
            }
        };

        Ok(FrameReport { faces, annotated })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators shared by the pipeline and loop tests.

    use super::*;
    use crate::alert::AlertError;
    use crate::annotate::AnnotateError;
    use crate::gallery::GalleryEntry;
    use crate::recorder::RecorderError;
    use crate::types::{Embedding, FaceRegion};
    use chrono::{TimeDelta, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap()
    }

    pub fn alice_gallery() -> Arc<Gallery> {
        Arc::new(
            Gallery::from_entries(vec![GalleryEntry {
                identity: "Alice".into(),
                embedding: Embedding::new(vec![0.0, 0.0]),
            }])
            .unwrap(),
        )
    }

    /// A face whose embedding sits `distance` away from Alice's reference.
    pub fn face_at(distance: f32) -> DetectedFace {
        DetectedFace {
            region: FaceRegion { top: 10, right: 50, bottom: 60, left: 10 },
            embedding: Embedding::new(vec![distance, 0.0]),
        }
    }

    pub struct ManualClock(pub Mutex<DateTime<Local>>);

    impl ManualClock {
        pub fn new(start: DateTime<Local>) -> Self {
            Self(Mutex::new(start))
        }

        pub fn set(&self, now: DateTime<Local>) {
            *self.0.lock().unwrap() = now;
        }

        pub fn advance(&self, by: TimeDelta) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    pub struct MemoryRecorder {
        pub events: Mutex<Vec<AlertEvent>>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl MemoryRecorder {
        pub fn events(&self) -> Vec<AlertEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventRecorder for MemoryRecorder {
        fn record(&self, event: &AlertEvent) -> Result<(), RecorderError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RecorderError::Io(std::io::Error::other("disk full")));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct CountingAlert {
        pub fired: AtomicUsize,
        pub fail: bool,
    }

    impl CountingAlert {
        pub fn fired(&self) -> usize {
            self.fired.load(Ordering::SeqCst)
        }
    }

    impl AlertSink for CountingAlert {
        fn notify(&self) -> Result<(), AlertError> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AlertError::Failed("no audio device".into()));
            }
            Ok(())
        }
    }

    /// Returns the scripted faces for every frame, or fails when `fail` is set.
    pub struct ScriptedEmbedder {
        pub faces: Vec<DetectedFace>,
        pub fail: bool,
    }

    impl FaceEmbedder for ScriptedEmbedder {
        fn detect_and_embed(&mut self, _frame: &RgbImage) -> Result<Vec<DetectedFace>, EmbedderError> {
            if self.fail {
                return Err(EmbedderError::Failed("scripted failure".into()));
            }
            Ok(self.faces.clone())
        }
    }

    /// Records how many faces it was asked to draw, per frame.
    #[derive(Default)]
    pub struct RecordingAnnotator {
        pub frames: Arc<Mutex<Vec<Vec<String>>>>,
        pub fail: bool,
    }

    impl FrameAnnotator for RecordingAnnotator {
        fn annotate(&mut self, _frame: &mut RgbImage, faces: &[FaceOutcome]) -> Result<(), AnnotateError> {
            self.frames
                .lock()
                .unwrap()
                .push(faces.iter().map(|f| f.result.label()).collect());
            if self.fail {
                return Err(AnnotateError::Output("display gone".into()));
            }
            Ok(())
        }
    }
}
