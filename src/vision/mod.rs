//! Imaging device and face analysis boundaries used by the detector.

use async_trait::async_trait;
use serde::Serialize;

mod browser;
mod deepface;
#[cfg(feature = "opencv")]
mod opencv;

pub use browser::{BrowserCamera, BrowserVision};
pub use deepface::DeepFaceClient;
#[cfg(feature = "opencv")]
pub use opencv::{CascadeFaceDetector, OpenCvCamera};

/// One JPEG-encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub jpeg: Vec<u8>,
}

impl Frame {
    pub fn new(jpeg: Vec<u8>) -> Self {
        Self { jpeg }
    }
}

/// Bounding box of a detected face, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Label produced by an emotion classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

/// Source of device handles.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Acquires the device.
    async fn open(&self) -> anyhow::Result<Box<dyn CameraHandle>>;
}

/// An acquired imaging device.
#[async_trait]
pub trait CameraHandle: Send {
    async fn read_frame(&mut self) -> anyhow::Result<Frame>;

    /// Gives the device back. Calling it more than once is harmless.
    fn release(&mut self);
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Face regions found in `frame`, possibly none.
    async fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<Region>>;
}

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    /// Dominant emotion in `frame`, or `None` when no label applies.
    async fn classify(&self, frame: &Frame) -> anyhow::Result<Option<Classification>>;
}

/// Owns a [`CameraHandle`] and releases it when dropped.
pub struct DeviceGuard {
    handle: Box<dyn CameraHandle>,
}

impl DeviceGuard {
    pub fn new(handle: Box<dyn CameraHandle>) -> Self {
        Self { handle }
    }

    pub async fn read_frame(&mut self) -> anyhow::Result<Frame> {
        self.handle.read_frame().await
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.handle.release();
        tracing::debug!("imaging device released");
    }
}
