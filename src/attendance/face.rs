//! Face capture and comparison.
//!
//! The camera is held only for the duration of a single [`FaceVerifier::capture`]
//! call; the stream guard stops the device on every exit path, including when
//! the capturing future is dropped mid-flight.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::{debug, warn};

/// Similarity at or above this value is accepted as the enrolled user.
pub const FACE_MATCH_THRESHOLD: f64 = 0.75;

/// Smallest sample the histogram comparer accepts.
pub const MIN_SAMPLE_BYTES: usize = 64;

/// One still frame, as raw image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceSample(Vec<u8>);

impl FaceSample {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Accepts plain base64 or a `data:image/...;base64,` URL.
    pub fn from_base64(encoded: &str) -> Result<Self, CaptureError> {
        let payload = match encoded.split_once(";base64,") {
            Some((_, data)) => data,
            None => encoded,
        };
        STANDARD
            .decode(payload.trim())
            .map(Self)
            .map_err(|e| CaptureError::InvalidFrame(e.to_string()))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error("camera access denied")]
    AccessDenied,
    #[error("no camera device available")]
    NoDevice,
    #[error("invalid camera frame: {0}")]
    InvalidFrame(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComparisonError {
    #[error("malformed face sample: {0}")]
    MalformedSample(String),
    #[error("similarity score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),
}

/// An opened camera feed.
#[async_trait]
pub trait CameraStream: Send {
    async fn grab_frame(&mut self) -> Result<FaceSample, CaptureError>;

    /// Releases the device. Must be safe to call more than once.
    fn stop(&mut self);
}

#[async_trait]
pub trait Camera: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CameraStream>, CaptureError>;
}

#[async_trait]
pub trait FaceComparer: Send + Sync {
    async fn compare(&self, sample: &FaceSample, reference: &FaceSample) -> Result<f64, ComparisonError>;
}

/// Stops the wrapped stream when dropped.
struct StreamGuard(Box<dyn CameraStream>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.stop();
        debug!("camera stream released");
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub score: f64,
    pub matched: bool,
}

pub fn is_match(score: f64) -> bool {
    score >= FACE_MATCH_THRESHOLD
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
}

#[derive(Clone)]
pub struct FaceVerifier {
    comparer: Arc<dyn FaceComparer>,
}

impl FaceVerifier {
    pub fn new(comparer: Arc<dyn FaceComparer>) -> Self {
        Self { comparer }
    }

    pub async fn capture(&self, camera: &dyn Camera) -> Result<FaceSample, CaptureError> {
        let mut stream = StreamGuard(camera.open().await?);
        let frame = stream.0.grab_frame().await?;
        if frame.is_empty() {
            return Err(CaptureError::InvalidFrame("empty frame".into()));
        }
        Ok(frame)
    }

    pub async fn compare(&self, sample: &FaceSample, reference: &FaceSample) -> Result<f64, ComparisonError> {
        let score = self.comparer.compare(sample, reference).await?;
        if !(0.0..=1.0).contains(&score) {
            warn!(score, "comparer returned an out-of-range score");
            return Err(ComparisonError::ScoreOutOfRange(score));
        }
        Ok(score)
    }

    /// Captures a fresh sample and compares it with `reference`. Nothing is cached.
    pub async fn verify(&self, camera: &dyn Camera, reference: &FaceSample) -> Result<Verification, VerifyError> {
        let sample = self.capture(camera).await?;
        let score = self.compare(&sample, reference).await?;
        Ok(Verification {
            score,
            matched: is_match(score),
        })
    }
}

/// Cosine similarity of the byte-intensity histograms of two samples.
///
/// Histograms are non-negative so the result always lies in [0, 1].
#[derive(Debug, Default, Clone, Copy)]
pub struct HistogramComparer;

impl HistogramComparer {
    fn histogram(sample: &FaceSample) -> [f64; 256] {
        let mut bins = [0.0; 256];
        for &b in sample.as_bytes() {
            bins[b as usize] += 1.0;
        }
        bins
    }
}

#[async_trait]
impl FaceComparer for HistogramComparer {
    async fn compare(&self, sample: &FaceSample, reference: &FaceSample) -> Result<f64, ComparisonError> {
        for (label, s) in [("sample", sample), ("reference", reference)] {
            if s.len() < MIN_SAMPLE_BYTES {
                return Err(ComparisonError::MalformedSample(format!(
                    "{label} has {} bytes, need at least {MIN_SAMPLE_BYTES}",
                    s.len()
                )));
            }
        }

        let a = Self::histogram(sample);
        let b = Self::histogram(reference);
        let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

        Ok((dot / (norm_a * norm_b)).clamp(0.0, 1.0))
    }
}

/// A camera backed by a frame the client already captured.
pub struct SubmittedFrameCamera {
    frame: Option<FaceSample>,
}

impl SubmittedFrameCamera {
    pub fn new(frame: Option<FaceSample>) -> Self {
        Self { frame }
    }
}

struct SubmittedFrameStream {
    frame: Option<FaceSample>,
}

#[async_trait]
impl CameraStream for SubmittedFrameStream {
    async fn grab_frame(&mut self) -> Result<FaceSample, CaptureError> {
        self.frame.take().ok_or(CaptureError::NoDevice)
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}

#[async_trait]
impl Camera for SubmittedFrameCamera {
    async fn open(&self) -> Result<Box<dyn CameraStream>, CaptureError> {
        match &self.frame {
            Some(frame) => Ok(Box::new(SubmittedFrameStream {
                frame: Some(frame.clone()),
            })),
            None => Err(CaptureError::NoDevice),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts opens and releases so tests can check the device is always freed.
    #[derive(Default)]
    pub struct CountingCamera {
        pub frame: Option<Vec<u8>>,
        pub fail_grab: bool,
        /// `grab_frame` never resolves.
        pub hang_grab: bool,
        pub opened: Arc<AtomicUsize>,
        pub released: Arc<AtomicUsize>,
    }

    struct CountingStream {
        frame: Option<Vec<u8>>,
        fail_grab: bool,
        hang_grab: bool,
        released: Arc<AtomicUsize>,
        stopped: bool,
    }

    #[async_trait]
    impl CameraStream for CountingStream {
        async fn grab_frame(&mut self) -> Result<FaceSample, CaptureError> {
            if self.hang_grab {
                std::future::pending::<()>().await;
            }
            if self.fail_grab {
                return Err(CaptureError::InvalidFrame("sensor glitch".into()));
            }
            self.frame.take().map(FaceSample::new).ok_or(CaptureError::NoDevice)
        }

        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.released.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl Camera for CountingCamera {
        async fn open(&self) -> Result<Box<dyn CameraStream>, CaptureError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingStream {
                frame: self.frame.clone(),
                fail_grab: self.fail_grab,
                hang_grab: self.hang_grab,
                released: self.released.clone(),
                stopped: false,
            }))
        }
    }

    /// Always answers with the configured score.
    pub struct FixedScore(pub Mutex<f64>);

    impl FixedScore {
        pub fn new(score: f64) -> Self {
            Self(Mutex::new(score))
        }
    }

    #[async_trait]
    impl FaceComparer for FixedScore {
        async fn compare(&self, _: &FaceSample, _: &FaceSample) -> Result<f64, ComparisonError> {
            Ok(*self.0.lock().unwrap())
        }
    }
}
