//! Frame source boundary: where the loop gets its frames from.

use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("end of stream")]
    EndOfStream,
}

/// A stream of RGB frames, pulled one at a time.
///
/// `Ok(None)` is a normally-empty frame (dropped, dark, or not yet ready)
/// and is skipped. Any `Err` ends the session.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError>;
}

/// Acquires a [`FrameSource`] for one capture session.
///
/// The source is released by dropping it, so a session always returns it
/// on every exit path.
pub trait SourceOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, SourceError>;
}
