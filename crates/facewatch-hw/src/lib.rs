//! facewatch-hw: colour camera capture for the surveillance daemon.
//!
//! Wraps a V4L2 device in a persistent mmap stream and converts YUYV or
//! MJPEG buffers into RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
