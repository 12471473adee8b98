use facewatch_core::{read_events, LoopError, RecorderError, SurveillanceLoop};
use std::path::PathBuf;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.freedesktop.FaceWatch1";
pub const OBJECT_PATH: &str = "/org/freedesktop/FaceWatch1";

/// D-Bus interface for the facewatch surveillance daemon.
///
/// Bus name: org.freedesktop.FaceWatch1
/// Object path: /org/freedesktop/FaceWatch1
pub struct FaceWatchService {
    surveillance: Arc<SurveillanceLoop>,
    event_log: PathBuf,
}

impl FaceWatchService {
    pub fn new(surveillance: Arc<SurveillanceLoop>, event_log: PathBuf) -> Self {
        Self {
            surveillance,
            event_log,
        }
    }

    fn status_json(&self) -> String {
        let pipeline = self.surveillance.pipeline();
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "gallery": pipeline.gallery().identities(),
            "identities_in_cooldown": pipeline.cooldown().tracked(),
            "event_log": self.event_log.display().to_string(),
            "loop": self.surveillance.status(),
        })
        .to_string()
    }

    /// The newest `limit` events, oldest first, as a JSON array.
    fn recent_events_json(&self, limit: usize) -> Result<String, RecorderError> {
        let events = read_events(&self.event_log)?;
        let skip = events.len().saturating_sub(limit);
        let rows: Vec<_> = events[skip..]
            .iter()
            .map(|e| {
                serde_json::json!({
                    "identity": e.identity,
                    "confidence": e.confidence_field(),
                    "timestamp": e.timestamp_field(),
                })
            })
            .collect();
        Ok(serde_json::Value::Array(rows).to_string())
    }
}

fn loop_error_to_fdo(err: LoopError) -> zbus::fdo::Error {
    match err {
        LoopError::NoCamera(_) => zbus::fdo::Error::Failed(err.to_string()),
        other => zbus::fdo::Error::IOError(other.to_string()),
    }
}

#[interface(name = "org.freedesktop.FaceWatch1")]
impl FaceWatchService {
    /// Start surveillance. Returns false if it was already running.
    async fn start(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("start requested");
        let surveillance = Arc::clone(&self.surveillance);
        tokio::task::spawn_blocking(move || surveillance.start())
            .await
            .map_err(|e| zbus::fdo::Error::Failed(format!("start task failed: {e}")))?
            .map_err(loop_error_to_fdo)
    }

    /// Stop surveillance. Returns false if it was not running.
    async fn stop(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("stop requested");
        let surveillance = Arc::clone(&self.surveillance);
        tokio::task::spawn_blocking(move || surveillance.stop())
            .await
            .map_err(|e| zbus::fdo::Error::Failed(format!("stop task failed: {e}")))?
            .map_err(loop_error_to_fdo)
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.status_json())
    }

    /// Return the most recent recorded events as a JSON array.
    async fn recent_events(&self, limit: u32) -> zbus::fdo::Result<String> {
        tracing::debug!(limit, "recent_events requested");
        self.recent_events_json(limit as usize)
            .map_err(|e| zbus::fdo::Error::IOError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facewatch_core::{
        AlertError, AlertEvent, AlertSink, BoxAnnotator, CooldownTracker, CsvEventRecorder,
        DetectedFace, EmbedderError, EventRecorder, FaceEmbedder, FrameSource, Gallery,
        GalleryEntry, Embedding, Pipeline, SharedCooldown, SourceError, SourceOpener,
    };
    use chrono::{Local, TimeZone};
    use image::RgbImage;

    struct NoCameraOpener;

    impl SourceOpener for NoCameraOpener {
        fn open(&self) -> Result<Box<dyn FrameSource>, SourceError> {
            Err(SourceError::Unavailable("/dev/video0: no such device".into()))
        }
    }

    struct NoFaces;

    impl FaceEmbedder for NoFaces {
        fn detect_and_embed(&mut self, _frame: &RgbImage) -> Result<Vec<DetectedFace>, EmbedderError> {
            Ok(Vec::new())
        }
    }

    struct Silent;

    impl AlertSink for Silent {
        fn notify(&self) -> Result<(), AlertError> {
            Ok(())
        }
    }

    fn service(event_log: PathBuf) -> FaceWatchService {
        let gallery = Gallery::from_entries(vec![GalleryEntry {
            identity: "Alice".into(),
            embedding: Embedding::new(vec![0.0, 0.0]),
        }])
        .unwrap();
        let pipeline = Pipeline::new(
            Arc::new(gallery),
            Arc::new(SharedCooldown::new(CooldownTracker::default())),
            Arc::new(CsvEventRecorder::new(&event_log)),
            Arc::new(Silent),
        );
        let surveillance = SurveillanceLoop::new(pipeline, NoCameraOpener, NoFaces, BoxAnnotator::new());
        FaceWatchService::new(Arc::new(surveillance), event_log)
    }

    #[test]
    fn test_status_json() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path().join("events.csv"));

        let status: serde_json::Value = serde_json::from_str(&svc.status_json()).unwrap();
        assert_eq!(status["gallery"], serde_json::json!(["Alice"]));
        assert_eq!(status["loop"]["state"], "idle");
        assert_eq!(status["identities_in_cooldown"], 0);
    }

    #[test]
    fn test_recent_events_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path().join("events.csv"));
        assert_eq!(svc.recent_events_json(10).unwrap(), "[]");
    }

    #[test]
    fn test_recent_events_newest_last() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("events.csv");
        let recorder = CsvEventRecorder::new(&log);
        for (i, name) in ["Alice", "Bob", "Carol"].iter().enumerate() {
            let at = Local.with_ymd_and_hms(2024, 1, 15, 10, i as u32, 0).unwrap();
            recorder.record(&AlertEvent::new(*name, 70.0, at)).unwrap();
        }

        let svc = service(log);
        let events: serde_json::Value =
            serde_json::from_str(&svc.recent_events_json(2).unwrap()).unwrap();
        let events = events.as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["identity"], "Bob");
        assert_eq!(events[1]["identity"], "Carol");
        assert_eq!(events[1]["confidence"], "70.00%");
        assert_eq!(events[1]["timestamp"], "2024-01-15 10:02:00");
    }

    #[test]
    fn test_no_camera_maps_to_failed() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path().join("events.csv"));

        let err = svc.surveillance.start().unwrap_err();
        match loop_error_to_fdo(err) {
            zbus::fdo::Error::Failed(msg) => assert!(msg.contains("no camera available")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(svc.status_json().contains("no camera available"));
    }
}
