//! Background emotion polling.
//!
//! The detector owns at most one polling task. Each tick grabs a frame,
//! looks for faces and, when one is present, asks the classifier for the
//! dominant emotion. The outcome (a label or one of the sentinels) replaces
//! whatever the [`EmotionStore`] held before.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::emotion::{EmotionStore, NO_FACE, UNKNOWN};
use crate::error::SettingsError;
use crate::vision::{Camera, Classification, DeviceGuard, EmotionClassifier, FaceDetector, Frame};

/// Consecutive frame failures that end a run.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;
/// Attempts made by [`EmotionDetector::detect_once`].
pub const ONE_SHOT_ATTEMPTS: usize = 5;

const FAILURE_PAUSE: Duration = Duration::from_secs(1);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of [`EmotionDetector::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Start {
    Started,
    AlreadyRunning,
    /// Detection is disabled; nothing was launched.
    Disabled,
}

/// Snapshot returned by [`EmotionDetector::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectorStatus {
    pub running: bool,
    pub enabled: bool,
    pub interval_secs: u64,
    pub store_path: String,
}

struct Run {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Flags {
    enabled: AtomicBool,
    interval_secs: AtomicU64,
}

impl Flags {
    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.load(Ordering::SeqCst))
    }
}

/// Everything a polling task needs, cloned into it at start.
#[derive(Clone)]
struct Pipeline {
    camera: Arc<dyn Camera>,
    faces: Arc<dyn FaceDetector>,
    classifier: Arc<dyn EmotionClassifier>,
    store: Arc<EmotionStore>,
    flags: Arc<Flags>,
}

/// Start/stoppable background loop feeding the [`EmotionStore`].
///
/// States are `Stopped`/`Running` crossed with an `enabled` flag. Only an
/// enabled detector can start, and disabling a running one stops it.
pub struct EmotionDetector {
    pipeline: Pipeline,
    run: Mutex<Option<Run>>,
    stop_timeout: Duration,
}

impl EmotionDetector {
    pub fn new(
        camera: Arc<dyn Camera>,
        faces: Arc<dyn FaceDetector>,
        classifier: Arc<dyn EmotionClassifier>,
        store: Arc<EmotionStore>,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                camera,
                faces,
                classifier,
                store,
                flags: Arc::new(Flags {
                    enabled: AtomicBool::new(true),
                    interval_secs: AtomicU64::new(5),
                }),
            },
            run: Mutex::new(None),
            stop_timeout: STOP_TIMEOUT,
        }
    }

    /// Sets the polling interval, clamped to at least one second.
    pub fn with_interval(self, secs: u64) -> Self {
        self.pipeline
            .flags
            .interval_secs
            .store(secs.max(1), Ordering::SeqCst);
        self
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        self.pipeline.flags.enabled.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<EmotionStore> {
        &self.pipeline.store
    }

    /// Launches the polling task unless one is already running.
    pub async fn start(&self) -> Start {
        let mut run = self.run.lock().await;
        if run.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            warn!("emotion detection is already running");
            return Start::AlreadyRunning;
        }
        if !self.pipeline.flags.enabled() {
            info!("emotion detection is disabled");
            return Start::Disabled;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.pipeline.clone().poll(cancel.clone()));
        *run = Some(Run { cancel, handle });
        Start::Started
    }

    /// Signals the polling task to exit and waits a bounded time for it.
    ///
    /// Returns `false` when nothing was running.
    pub async fn stop(&self) -> bool {
        let mut run = self.run.lock().await;
        let Some(Run { cancel, mut handle }) = run.take() else {
            debug!("emotion detection is not running");
            return false;
        };
        let was_running = !handle.is_finished();
        cancel.cancel();
        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = ?e, "emotion detection task failed"),
            Err(_) => {
                warn!(timeout = ?self.stop_timeout, "emotion detection did not stop in time, aborting");
                handle.abort();
            }
        }
        info!("emotion detection stopped");
        was_running
    }

    /// Whether a polling task is currently alive.
    pub async fn is_running(&self) -> bool {
        self.run
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub fn is_enabled(&self) -> bool {
        self.pipeline.flags.enabled()
    }

    /// Enables or disables detection; disabling stops a running loop.
    pub async fn set_enabled(&self, enabled: bool) {
        self.pipeline.flags.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "emotion detection toggled");
        if !enabled {
            self.stop().await;
        }
    }

    /// Changes the interval used from the next tick on.
    ///
    /// Values below one second are raised to one.
    pub fn set_interval(&self, secs: u64) -> u64 {
        let secs = secs.max(1);
        self.pipeline
            .flags
            .interval_secs
            .store(secs, Ordering::SeqCst);
        info!(secs, "detection interval changed");
        secs
    }

    /// Like [`set_interval`](Self::set_interval) but rejects values below one.
    pub fn try_set_interval(&self, secs: i64) -> Result<u64, SettingsError> {
        if secs < 1 {
            return Err(SettingsError::IntervalTooShort(secs));
        }
        Ok(self.set_interval(secs as u64))
    }

    pub fn interval(&self) -> Duration {
        self.pipeline.flags.interval()
    }

    pub async fn status(&self) -> DetectorStatus {
        DetectorStatus {
            running: self.is_running().await,
            enabled: self.is_enabled(),
            interval_secs: self.interval().as_secs(),
            store_path: self.pipeline.store.location(),
        }
    }

    /// Runs a single detection outside the polling loop.
    ///
    /// Tries up to [`ONE_SHOT_ATTEMPTS`] frames and stores the first label
    /// the classifier produces. Frames without a face or without a label are
    /// retried after a short pause.
    pub async fn detect_once(&self) -> Option<Classification> {
        let p = &self.pipeline;
        let handle = match p.camera.open().await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = ?e, "could not open imaging device");
                return None;
            }
        };
        let mut device = DeviceGuard::new(handle);
        for attempt in 1..=ONE_SHOT_ATTEMPTS {
            let frame = match device.read_frame().await {
                Ok(f) => f,
                Err(e) => {
                    debug!(error = ?e, attempt, "frame capture failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            match p.faces.detect(&frame).await {
                Ok(regions) if !regions.is_empty() => {}
                Ok(_) => {
                    debug!(attempt, "no face in frame");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
                Err(e) => {
                    warn!(error = ?e, attempt, "face detection failed");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
            }
            match p.classifier.classify(&frame).await {
                Ok(Some(class)) => {
                    p.store.write(&class.label).await;
                    info!(label = %class.label, confidence = class.confidence, "emotion detected");
                    return Some(class);
                }
                Ok(None) => debug!(attempt, "classifier returned no label"),
                Err(e) => warn!(error = ?e, attempt, "emotion classification failed"),
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        None
    }
}

impl Pipeline {
    async fn poll(self, cancel: CancellationToken) {
        let handle = match self.camera.open().await {
            Ok(h) => h,
            Err(e) => {
                error!(error = ?e, "could not open imaging device");
                return;
            }
        };
        let mut device = DeviceGuard::new(handle);
        let mut failures = 0u32;
        info!(interval = ?self.flags.interval(), "emotion detection started");

        while self.flags.enabled() {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = device.read_frame() => frame,
            };
            match frame {
                Ok(frame) => {
                    failures = 0;
                    let label = tokio::select! {
                        _ = cancel.cancelled() => break,
                        label = self.label_for(&frame) => label,
                    };
                    self.store.write(&label).await;
                }
                Err(e) => {
                    failures += 1;
                    warn!(error = ?e, failures, "frame capture failed");
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        error!(failures, "too many consecutive capture failures, giving up");
                        break;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(FAILURE_PAUSE) => {}
                    }
                    continue;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.flags.interval()) => {}
            }
        }
        drop(device);
        info!("emotion detection loop exited");
    }

    async fn label_for(&self, frame: &Frame) -> String {
        let regions = match self.faces.detect(frame).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = ?e, "face detection failed");
                return UNKNOWN.to_string();
            }
        };
        if regions.is_empty() {
            return NO_FACE.to_string();
        }
        match self.classifier.classify(frame).await {
            Ok(Some(class)) => class.label,
            Ok(None) => UNKNOWN.to_string(),
            Err(e) => {
                warn!(error = ?e, "emotion classification failed");
                UNKNOWN.to_string()
            }
        }
    }
}
