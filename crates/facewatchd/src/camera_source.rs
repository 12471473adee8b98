//! V4L2 camera as the surveillance loop's frame source.

use facewatch_core::{FrameSource, SourceError, SourceOpener};
use facewatch_hw::{Camera, CameraError, Frame};
use image::RgbImage;

/// Opens the configured camera once per capture session.
pub struct CameraOpener {
    device: String,
    width: u32,
    height: u32,
    warmup_frames: usize,
}

impl CameraOpener {
    pub fn new(device: impl Into<String>, width: u32, height: u32, warmup_frames: usize) -> Self {
        Self {
            device: device.into(),
            width,
            height,
            warmup_frames,
        }
    }
}

impl SourceOpener for CameraOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, SourceError> {
        let mut camera = Camera::open(&self.device, self.width, self.height)
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        camera
            .discard_warmup(self.warmup_frames)
            .map_err(|e| SourceError::Unavailable(format!("warmup failed: {e}")))?;
        Ok(Box::new(CameraSource { camera }))
    }
}

/// A live camera stream. Released when dropped.
pub struct CameraSource {
    camera: Camera,
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        classify(self.camera.capture_frame())
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        tracing::info!(device = %self.camera.device_path, "camera released");
    }
}

/// Dark frames and undecodable buffers are empty frames; anything else
/// from the device ends the session.
fn classify(captured: Result<Frame, CameraError>) -> Result<Option<RgbImage>, SourceError> {
    match captured {
        Ok(frame) if frame.is_dark => {
            tracing::trace!(sequence = frame.sequence, "dark frame skipped");
            Ok(None)
        }
        Ok(frame) => Ok(Some(frame.image)),
        Err(CameraError::BadFrame(e)) => {
            tracing::debug!(error = %e, "undecodable frame skipped");
            Ok(None)
        }
        Err(e) => Err(SourceError::CaptureFailed(e.to_string())),
    }
}
