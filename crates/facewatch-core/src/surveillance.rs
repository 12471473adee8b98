//! The capture loop: a single worker thread that pulls frames and feeds
//! them through the [`Pipeline`] until stopped or until the source fails.
//!
//! States: `Idle → Running → (Stopping) → Idle`. At most one worker runs
//! per [`SurveillanceLoop`]; [`start`](SurveillanceLoop::start) while running
//! is a no-op returning `false`, [`stop`](SurveillanceLoop::stop) while idle
//! is a no-op returning `false`.

use crate::annotate::FrameAnnotator;
use crate::embedder::FaceEmbedder;
use crate::pipeline::Pipeline;
use crate::source::{FrameSource, SourceError, SourceOpener};
use crate::types::Decision;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("no camera available: {0}")]
    NoCamera(SourceError),
    #[error("camera disconnected mid-session: {0}")]
    CameraDisconnected(SourceError),
    #[error("failed to spawn capture worker: {0}")]
    Spawn(std::io::Error),
    #[error("capture worker panicked")]
    WorkerPanicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    Stopping,
}

/// Snapshot of the loop's state and counters since construction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStatus {
    pub state: LoopState,
    pub sessions: u64,
    pub frames_processed: u64,
    /// Normally-empty frames the source reported.
    pub frames_skipped: u64,
    /// Frames whose detection step failed.
    pub frames_failed: u64,
    pub faces_seen: u64,
    pub accepted: u64,
    pub suppressed: u64,
    pub unknown: u64,
    /// User-facing message of the last fatal error, cleared on a successful start.
    pub last_error: Option<String>,
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    pipeline: Pipeline,
    opener: Box<dyn SourceOpener>,
    embedder: Mutex<Box<dyn FaceEmbedder + Send>>,
    annotator: Mutex<Box<dyn FrameAnnotator>>,
    status: Mutex<LoopStatus>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), LoopError>>,
}

/// Owns the pipeline and collaborators, and at most one capture worker.
pub struct SurveillanceLoop {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl SurveillanceLoop {
    pub fn new(
        pipeline: Pipeline,
        opener: impl SourceOpener + 'static,
        embedder: impl FaceEmbedder + Send + 'static,
        annotator: impl FrameAnnotator + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pipeline,
                opener: Box::new(opener),
                embedder: Mutex::new(Box::new(embedder)),
                annotator: Mutex::new(Box::new(annotator)),
                status: Mutex::new(LoopStatus::default()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.shared.pipeline
    }

    pub fn status(&self) -> LoopStatus {
        lock(&self.shared.status).clone()
    }

    pub fn state(&self) -> LoopState {
        lock(&self.shared.status).state
    }

    /// Open the frame source and start the capture worker.
    ///
    /// Returns `Ok(false)` without side effects if a session is already
    /// running, and `Err(LoopError::NoCamera)` if the source cannot be
    /// opened (the loop stays idle).
    pub fn start(&self) -> Result<bool, LoopError> {
        let mut slot = lock(&self.worker);

        if let Some(worker) = slot.take() {
            if self.state() != LoopState::Idle && !worker.handle.is_finished() {
                *slot = Some(worker);
                tracing::debug!("start requested while running; ignoring");
                return Ok(false);
            }
            // The previous session ended on its own; its outcome is already
            // in the status.
            let _ = self.reap(worker);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let shared = Arc::clone(&self.shared);
        let worker_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("facewatch-capture".into())
            .spawn(move || shared.run_session(&worker_stop, ready_tx))
            .map_err(LoopError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *slot = Some(Worker { stop, handle });
                Ok(true)
            }
            Ok(Err(source_err)) => {
                let _ = handle.join();
                let err = LoopError::NoCamera(source_err);
                tracing::error!(error = %err, "surveillance not started");
                lock(&self.shared.status).last_error = Some(err.to_string());
                Err(err)
            }
            Err(_) => {
                // The worker exited without reporting: it panicked while opening.
                let _ = handle.join();
                let mut status = lock(&self.shared.status);
                status.state = LoopState::Idle;
                status.last_error = Some(LoopError::WorkerPanicked.to_string());
                Err(LoopError::WorkerPanicked)
            }
        }
    }

    /// Ask the running worker to stop after its current frame, and wait for it.
    ///
    /// Returns `Ok(false)` if no session was running. If the session failed
    /// on its own before the stop was observed, that error is returned.
    pub fn stop(&self) -> Result<bool, LoopError> {
        let mut slot = lock(&self.worker);
        let Some(worker) = slot.take() else {
            return Ok(false);
        };

        {
            let mut status = lock(&self.shared.status);
            if status.state != LoopState::Running {
                // The session already ended on its own and reported its error.
                drop(status);
                let _ = self.reap(worker);
                return Ok(false);
            }
            status.state = LoopState::Stopping;
        }
        worker.stop.store(true, Ordering::Release);
        tracing::info!("stop requested; waiting for capture worker");

        self.reap(worker).map(|()| true)
    }

    /// Join a worker and make sure the status reflects its exit.
    fn reap(&self, worker: Worker) -> Result<(), LoopError> {
        match worker.handle.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                let mut status = lock(&self.shared.status);
                status.state = LoopState::Idle;
                status.last_error = Some(LoopError::WorkerPanicked.to_string());
                Err(LoopError::WorkerPanicked)
            }
        }
    }
}

impl Drop for SurveillanceLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "capture worker ended with error during shutdown");
        }
    }
}

impl Shared {
    fn run_session(
        &self,
        stop: &AtomicBool,
        ready: SyncSender<Result<(), SourceError>>,
    ) -> Result<(), LoopError> {
        let mut source = match self.opener.open() {
            Ok(source) => source,
            Err(e) => {
                let _ = ready.send(Err(e));
                return Ok(());
            }
        };

        {
            let mut status = lock(&self.status);
            status.state = LoopState::Running;
            status.sessions += 1;
            status.last_error = None;
        }
        let _ = ready.send(Ok(()));
        tracing::info!(
            identities = self.pipeline.gallery().identities().len(),
            "surveillance session started"
        );

        let outcome = self.pump(source.as_mut(), stop);
        drop(source);

        let mut status = lock(&self.status);
        status.state = LoopState::Idle;
        match &outcome {
            Ok(()) => tracing::info!("surveillance session stopped"),
            Err(e) => {
                tracing::error!(error = %e, "surveillance session ended");
                status.last_error = Some(e.to_string());
            }
        }
        outcome
    }

    /// Frame loop. The stop flag is checked once per iteration, so the
    /// frame in flight always completes.
    fn pump(&self, source: &mut dyn FrameSource, stop: &AtomicBool) -> Result<(), LoopError> {
        let mut embedder = lock(&self.embedder);
        let mut annotator = lock(&self.annotator);

        while !stop.load(Ordering::Acquire) {
            let mut frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    lock(&self.status).frames_skipped += 1;
                    continue;
                }
                Err(e) => return Err(LoopError::CameraDisconnected(e)),
            };

            let result = self
                .pipeline
                .process_frame(&mut **embedder, &mut **annotator, &mut frame);

            let mut status = lock(&self.status);
            match result {
                Ok(report) => {
                    status.frames_processed += 1;
                    status.faces_seen += report.faces.len() as u64;
                    status.accepted += report.count(Decision::Accepted) as u64;
                    status.suppressed += report.count(Decision::Suppressed) as u64;
                    status.unknown += report.count(Decision::Unknown) as u64;
                }
                Err(e) => {
                    status.frames_failed += 1;
                    tracing::warn!(error = %e, "skipping frame");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooldown::SharedCooldown;
    use crate::pipeline::testing::*;
    use image::RgbImage;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    /// One scripted step of a frame source.
    #[derive(Clone)]
    enum Step {
        Frame,
        Empty,
        Fail,
    }

    /// Replays a script, then either ends the stream or repeats frames forever.
    struct ScriptedSource {
        steps: VecDeque<Step>,
        endless: bool,
        released: Arc<AtomicUsize>,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
            match self.steps.pop_front() {
                Some(Step::Frame) => Ok(Some(RgbImage::new(16, 16))),
                Some(Step::Empty) => Ok(None),
                Some(Step::Fail) => Err(SourceError::CaptureFailed("usb reset".into())),
                None if self.endless => {
                    std::thread::sleep(Duration::from_millis(2));
                    Ok(Some(RgbImage::new(16, 16)))
                }
                None => Err(SourceError::EndOfStream),
            }
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedOpener {
        steps: Vec<Step>,
        endless: bool,
        available: bool,
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl ScriptedOpener {
        fn new(steps: Vec<Step>, endless: bool) -> Self {
            Self {
                steps,
                endless,
                available: true,
                opened: Arc::default(),
                released: Arc::default(),
            }
        }
    }

    impl SourceOpener for ScriptedOpener {
        fn open(&self) -> Result<Box<dyn FrameSource>, SourceError> {
            if !self.available {
                return Err(SourceError::Unavailable("/dev/video0: no such device".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSource {
                steps: self.steps.iter().cloned().collect(),
                endless: self.endless,
                released: Arc::clone(&self.released),
            }))
        }
    }

    struct Fixture {
        surveillance: SurveillanceLoop,
        recorder: Arc<MemoryRecorder>,
        alert: Arc<CountingAlert>,
        clock: Arc<ManualClock>,
        annotated: Arc<Mutex<Vec<Vec<String>>>>,
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    fn fixture(opener: ScriptedOpener, embedder: ScriptedEmbedder) -> Fixture {
        let recorder = Arc::new(MemoryRecorder::default());
        let alert = Arc::new(CountingAlert::default());
        let clock = Arc::new(ManualClock::new(at(10, 0, 0)));
        let pipeline = Pipeline::new(
            alice_gallery(),
            Arc::new(SharedCooldown::default()),
            recorder.clone(),
            alert.clone(),
        )
        .with_clock(clock.clone());
        let annotator = RecordingAnnotator::default();
        let annotated = Arc::clone(&annotator.frames);
        let opened = Arc::clone(&opener.opened);
        let released = Arc::clone(&opener.released);

        Fixture {
            surveillance: SurveillanceLoop::new(pipeline, opener, embedder, annotator),
            recorder,
            alert,
            clock,
            annotated,
            opened,
            released,
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_no_camera_stays_idle() {
        let mut opener = ScriptedOpener::new(vec![], false);
        opener.available = false;
        let f = fixture(opener, ScriptedEmbedder { faces: vec![], fail: false });

        let err = f.surveillance.start().unwrap_err();
        assert!(matches!(err, LoopError::NoCamera(_)));
        assert!(err.to_string().starts_with("no camera available"));

        let status = f.surveillance.status();
        assert_eq!(status.state, LoopState::Idle);
        assert_eq!(status.sessions, 0);
        assert_eq!(status.last_error.as_deref(), Some(err.to_string().as_str()));
    }

    #[test]
    fn test_disconnect_mid_session() {
        let opener = ScriptedOpener::new(vec![Step::Frame, Step::Frame, Step::Fail], false);
        let f = fixture(opener, ScriptedEmbedder { faces: vec![face_at(0.3)], fail: false });

        assert!(f.surveillance.start().unwrap());
        wait_until(|| f.surveillance.state() == LoopState::Idle);

        let status = f.surveillance.status();
        assert_eq!(status.frames_processed, 2);
        assert!(status
            .last_error
            .as_deref()
            .unwrap()
            .starts_with("camera disconnected mid-session"));
        assert_eq!(f.released.load(Ordering::SeqCst), 1);

        // The failure was already reported; stop on an idle loop is a no-op.
        assert!(!f.surveillance.stop().unwrap());
    }

    #[test]
    fn test_accept_once_then_suppress() {
        let opener = ScriptedOpener::new(vec![Step::Frame; 5], false);
        let f = fixture(opener, ScriptedEmbedder { faces: vec![face_at(0.3)], fail: false });

        f.surveillance.start().unwrap();
        wait_until(|| f.surveillance.state() == LoopState::Idle);

        let status = f.surveillance.status();
        assert_eq!(status.frames_processed, 5);
        assert_eq!(status.accepted, 1);
        assert_eq!(status.suppressed, 4);
        assert_eq!(f.recorder.events().len(), 1);
        assert_eq!(f.alert.fired(), 1);
        // Every face is rendered, suppressed or not.
        let annotated = f.annotated.lock().unwrap();
        assert_eq!(annotated.len(), 5);
        assert!(annotated.iter().all(|labels| labels == &["Alice (70.00%)"]));
    }

    #[test]
    fn test_unknown_faces_never_recorded() {
        let opener = ScriptedOpener::new(vec![Step::Frame; 10], false);
        let f = fixture(opener, ScriptedEmbedder { faces: vec![face_at(0.9)], fail: false });

        f.surveillance.start().unwrap();
        wait_until(|| f.surveillance.state() == LoopState::Idle);

        let status = f.surveillance.status();
        assert_eq!(status.unknown, 10);
        assert_eq!(status.accepted, 0);
        assert!(f.recorder.events().is_empty());
        assert_eq!(f.alert.fired(), 0);
        assert_eq!(f.surveillance.pipeline().cooldown().tracked(), 0);
    }

    #[test]
    fn test_empty_and_failed_frames_do_not_end_session() {
        let opener = ScriptedOpener::new(vec![Step::Empty, Step::Frame, Step::Empty], false);
        let f = fixture(opener, ScriptedEmbedder { faces: vec![face_at(0.3)], fail: true });

        f.surveillance.start().unwrap();
        wait_until(|| f.surveillance.state() == LoopState::Idle);

        let status = f.surveillance.status();
        assert_eq!(status.frames_skipped, 2);
        assert_eq!(status.frames_failed, 1);
        assert_eq!(status.frames_processed, 0);
        // The session ended at end of stream, not at the failed frame.
        assert!(status.last_error.as_deref().unwrap().contains("end of stream"));
    }

    #[test]
    fn test_start_stop_restart() {
        let opener = ScriptedOpener::new(vec![], true);
        let f = fixture(opener, ScriptedEmbedder { faces: vec![face_at(0.3)], fail: false });

        assert!(!f.surveillance.stop().unwrap());
        assert!(f.surveillance.start().unwrap());
        assert!(!f.surveillance.start().unwrap(), "second start is a no-op");
        assert_eq!(f.opened.load(Ordering::SeqCst), 1);

        wait_until(|| f.surveillance.status().frames_processed > 0);
        assert!(f.surveillance.stop().unwrap());
        assert_eq!(f.surveillance.state(), LoopState::Idle);
        assert_eq!(f.released.load(Ordering::SeqCst), 1);
        assert!(!f.surveillance.stop().unwrap());

        // Restart within the cooldown: Alice stays suppressed.
        f.clock.advance(chrono::TimeDelta::minutes(30));
        let suppressed_before = f.surveillance.status().suppressed;
        assert!(f.surveillance.start().unwrap());
        assert_eq!(f.surveillance.state(), LoopState::Running);
        wait_until(|| f.surveillance.status().suppressed > suppressed_before);
        assert!(f.surveillance.stop().unwrap());

        let status = f.surveillance.status();
        assert_eq!(status.sessions, 2);
        assert_eq!(status.accepted, 1);
        assert!(status.last_error.is_none());
        assert_eq!(f.released.load(Ordering::SeqCst), 2);
        assert_eq!(f.recorder.events().len(), 1);
    }

    #[test]
    fn test_drop_releases_source() {
        let opener = ScriptedOpener::new(vec![], true);
        let f = fixture(opener, ScriptedEmbedder { faces: vec![], fail: false });
        let released = Arc::clone(&f.released);

        f.surveillance.start().unwrap();
        drop(f);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
