use anyhow::Context;
use async_trait::async_trait;
use opencv::{core, imgcodecs, imgproc, objdetect, prelude::*, videoio};
use std::sync::{Arc, Mutex};

use super::{Camera, CameraHandle, FaceDetector, Frame, Region};

/// Local webcam opened through OpenCV.
pub struct OpenCvCamera {
    index: i32,
}

impl OpenCvCamera {
    pub fn new(index: i32) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Camera for OpenCvCamera {
    async fn open(&self) -> anyhow::Result<Box<dyn CameraHandle>> {
        let index = self.index;
        let cap = tokio::task::spawn_blocking(move || -> anyhow::Result<videoio::VideoCapture> {
            let mut cap = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
            if !cap.is_opened()? {
                anyhow::bail!("camera {index} could not be opened");
            }
            cap.set(videoio::CAP_PROP_FRAME_WIDTH, 640.0)?;
            cap.set(videoio::CAP_PROP_FRAME_HEIGHT, 480.0)?;
            Ok(cap)
        })
        .await??;
        Ok(Box::new(OpenCvHandle {
            cap: Some(Arc::new(Mutex::new(cap))),
        }))
    }
}

struct OpenCvHandle {
    cap: Option<Arc<Mutex<videoio::VideoCapture>>>,
}

#[async_trait]
impl CameraHandle for OpenCvHandle {
    async fn read_frame(&mut self) -> anyhow::Result<Frame> {
        let cap = self
            .cap
            .clone()
            .ok_or_else(|| anyhow::anyhow!("camera released"))?;
        tokio::task::spawn_blocking(move || -> anyhow::Result<Frame> {
            let mut cap = cap
                .lock()
                .map_err(|_| anyhow::anyhow!("camera lock poisoned"))?;
            let mut mat = core::Mat::default();
            if !cap.read(&mut mat)? || mat.empty() {
                anyhow::bail!("camera returned no frame");
            }
            let mut buf = core::Vector::<u8>::new();
            imgcodecs::imencode(".jpg", &mat, &mut buf, &core::Vector::new())?;
            Ok(Frame::new(buf.to_vec()))
        })
        .await?
    }

    fn release(&mut self) {
        if let Some(cap) = self.cap.take() {
            close_off_thread(cap, |cap| {
                if let Err(e) = cap.release() {
                    tracing::warn!(error = ?e, "failed to release camera");
                }
            });
        }
    }
}

/// Runs `close` on the shared device without blocking the caller.
///
/// A cancelled read can still hold the lock on the blocking pool, so the
/// close waits its turn there. Outside a runtime it runs inline.
fn close_off_thread<T, F>(shared: Arc<Mutex<T>>, close: F)
where
    T: Send + 'static,
    F: FnOnce(&mut T) + Send + 'static,
{
    let job = move || match shared.lock() {
        Ok(mut device) => close(&mut device),
        Err(poisoned) => close(&mut poisoned.into_inner()),
    };
    match tokio::runtime::Handle::try_current() {
        Ok(rt) => {
            rt.spawn_blocking(job);
        }
        Err(_) => job(),
    }
}

/// Haar-cascade frontal face detector.
pub struct CascadeFaceDetector {
    cascade_path: String,
}

impl Default for CascadeFaceDetector {
    fn default() -> Self {
        Self {
            cascade_path: "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml"
                .into(),
        }
    }
}

impl CascadeFaceDetector {
    pub fn new(cascade_path: impl Into<String>) -> Self {
        Self {
            cascade_path: cascade_path.into(),
        }
    }
}

#[async_trait]
impl FaceDetector for CascadeFaceDetector {
    async fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<Region>> {
        let jpeg = frame.jpeg.clone();
        let path = self.cascade_path.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Region>> {
            let mat = imgcodecs::imdecode(&core::Vector::from_slice(&jpeg), imgcodecs::IMREAD_COLOR)?;
            let mut gray = core::Mat::default();
            imgproc::cvt_color(&mat, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
            let mut detector = objdetect::CascadeClassifier::new(&path)
                .with_context(|| format!("loading cascade {path}"))?;
            let mut faces = core::Vector::<core::Rect>::new();
            detector.detect_multi_scale(
                &gray,
                &mut faces,
                1.1,
                4,
                0,
                core::Size::new(30, 30),
                core::Size::new(0, 0),
            )?;
            Ok(faces
                .iter()
                .map(|r| Region {
                    x: r.x,
                    y: r.y,
                    w: r.width,
                    h: r.height,
                })
                .collect())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn close_does_not_wait_for_a_busy_reader() {
        let shared = Arc::new(Mutex::new(0u32));
        let (locked_tx, locked_rx) = mpsc::channel();
        let reader = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                let mut guard = shared.lock().unwrap();
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(300));
                *guard += 1;
            })
        };
        locked_rx.recv().unwrap();

        let began = Instant::now();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        close_off_thread(shared.clone(), move |n| {
            *n += 10;
            let _ = done_tx.send(*n);
        });
        assert!(began.elapsed() < Duration::from_millis(100));

        assert_eq!(done_rx.await.unwrap(), 11);
        reader.join().unwrap();
    }

    #[test]
    fn close_runs_inline_without_a_runtime() {
        let shared = Arc::new(Mutex::new(1u32));
        close_off_thread(shared.clone(), |n| *n = 0);
        assert_eq!(*shared.lock().unwrap(), 0);
    }
}
