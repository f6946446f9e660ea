//! Media capture: turns either a picked file or a live camera frame into a
//! single `CapturedImage` data URL.
//!
//! The camera stream is the only held resource. It is released on capture,
//! on stop, when a file is picked, on reset and when the source is dropped.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StepError;
use crate::llm::media::{detect_mime_type, encode_data_url};

const NO_CAMERA_MESSAGE: &str = "No camera is available or access was denied.";
const CAMERA_NOT_READY_MESSAGE: &str = "The camera is not active or ready to capture.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureOrigin {
    Upload,
    Camera,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub mime_type: String,
    pub data_url: String,
    pub origin: CaptureOrigin,
}

impl CapturedImage {
    pub fn from_bytes(bytes: &[u8], declared_mime: Option<&str>, origin: CaptureOrigin) -> Self {
        let mime_type = declared_mime
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .map(str::to_string)
            .or_else(|| detect_mime_type(bytes))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        CapturedImage {
            data_url: encode_data_url(&mime_type, bytes),
            mime_type,
            origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    CameraRequested,
    CameraActive,
    Captured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    /// Rear-facing camera.
    Environment,
    Any,
}

/// One raw RGBA video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, facing: CameraFacing) -> Result<Box<dyn CameraStream>, StepError>;
}

#[async_trait]
pub trait CameraStream: Send {
    /// Resolves once the stream has reported its frame dimensions.
    async fn ready(&mut self) -> Result<(), StepError>;
    fn snapshot(&mut self) -> Result<Frame, StepError>;
    fn stop(&mut self);
}

/// Device for headless runs: there is never a camera.
pub struct NoCameraDevice;

#[async_trait]
impl CameraDevice for NoCameraDevice {
    async fn open(&self, _facing: CameraFacing) -> Result<Box<dyn CameraStream>, StepError> {
        Err(StepError::ResourceUnavailable(NO_CAMERA_MESSAGE.to_string()))
    }
}

pub fn encode_frame_png(frame: Frame) -> Result<Vec<u8>, StepError> {
    let (width, height) = (frame.width, frame.height);
    let buffer = RgbaImage::from_raw(width, height, frame.rgba).ok_or_else(|| {
        StepError::LocalIo(format!("Camera frame does not match {width}x{height} RGBA"))
    })?;
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(buffer)
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| StepError::LocalIo(format!("Failed to encode camera frame: {err}")))?;
    Ok(cursor.into_inner())
}

pub struct CaptureSource {
    device: Arc<dyn CameraDevice>,
    stream: Option<Box<dyn CameraStream>>,
    state: CaptureState,
}

impl CaptureSource {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        CaptureSource {
            device,
            stream: None,
            state: CaptureState::Idle,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("Camera stream released");
        }
    }

    async fn open_with_fallback(&self) -> Result<Box<dyn CameraStream>, StepError> {
        match self.device.open(CameraFacing::Environment).await {
            Ok(stream) => Ok(stream),
            Err(err) => {
                warn!("Rear camera unavailable ({err}); trying any camera");
                self.device.open(CameraFacing::Any).await.map_err(|fallback_err| {
                    warn!("No camera could be opened: {fallback_err}");
                    StepError::ResourceUnavailable(NO_CAMERA_MESSAGE.to_string())
                })
            }
        }
    }

    /// Enters camera mode. On failure the source is back in `Idle` with no
    /// stream held.
    pub async fn start_camera(&mut self) -> Result<(), StepError> {
        self.release();
        self.state = CaptureState::CameraRequested;

        let mut stream = match self.open_with_fallback().await {
            Ok(stream) => stream,
            Err(err) => {
                self.state = CaptureState::Idle;
                return Err(err);
            }
        };

        if let Err(err) = stream.ready().await {
            stream.stop();
            self.state = CaptureState::Idle;
            warn!("Camera stream never became ready: {err}");
            return Err(StepError::ResourceUnavailable(NO_CAMERA_MESSAGE.to_string()));
        }

        self.stream = Some(stream);
        self.state = CaptureState::CameraActive;
        info!("Camera active");
        Ok(())
    }

    /// Snapshots the live frame as PNG and leaves camera mode.
    pub fn capture(&mut self) -> Result<CapturedImage, StepError> {
        let stream = match (self.state, self.stream.as_mut()) {
            (CaptureState::CameraActive, Some(stream)) => stream,
            _ => {
                return Err(StepError::ResourceUnavailable(
                    CAMERA_NOT_READY_MESSAGE.to_string(),
                ))
            }
        };

        let frame = stream.snapshot();
        self.release();
        let png = match frame.and_then(encode_frame_png) {
            Ok(png) => png,
            Err(err) => {
                self.state = CaptureState::Idle;
                return Err(err);
            }
        };

        self.state = CaptureState::Captured;
        Ok(CapturedImage::from_bytes(&png, Some("image/png"), CaptureOrigin::Camera))
    }

    pub fn stop_camera(&mut self) {
        self.release();
        if matches!(
            self.state,
            CaptureState::CameraRequested | CaptureState::CameraActive
        ) {
            self.state = CaptureState::Idle;
        }
    }

    pub async fn load_file(&mut self, path: &Path) -> Result<CapturedImage, StepError> {
        self.stop_camera();
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            warn!("Failed to read {}: {err}", path.display());
            StepError::LocalIo("The selected file could not be read.".to_string())
        })?;
        let image = self.load_bytes(&bytes, None);
        info!(
            "Loaded {} ({} bytes, {})",
            path.display(),
            bytes.len(),
            image.mime_type
        );
        Ok(image)
    }

    pub fn load_bytes(&mut self, bytes: &[u8], declared_mime: Option<&str>) -> CapturedImage {
        self.stop_camera();
        self.state = CaptureState::Captured;
        CapturedImage::from_bytes(bytes, declared_mime, CaptureOrigin::Upload)
    }

    pub fn reset(&mut self) {
        self.release();
        self.state = CaptureState::Idle;
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// Camera whose open/ready outcomes are scripted; `live` counts streams
    /// that were opened and not yet stopped.
    #[derive(Default)]
    pub struct FakeCamera {
        pub fail_environment: bool,
        pub fail_any: bool,
        pub fail_ready: bool,
        pub opened: Mutex<Vec<CameraFacing>>,
        pub live: Arc<AtomicUsize>,
    }

    impl FakeCamera {
        pub fn live_streams(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }
    }

    pub struct FakeStream {
        live: Arc<AtomicUsize>,
        fail_ready: bool,
        stopped: bool,
    }

    #[async_trait]
    impl CameraDevice for FakeCamera {
        async fn open(&self, facing: CameraFacing) -> Result<Box<dyn CameraStream>, StepError> {
            self.opened.lock().push(facing);
            let fails = match facing {
                CameraFacing::Environment => self.fail_environment,
                CameraFacing::Any => self.fail_any,
            };
            if fails {
                return Err(StepError::ResourceUnavailable("permission denied".to_string()));
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                live: self.live.clone(),
                fail_ready: self.fail_ready,
                stopped: false,
            }))
        }
    }

    #[async_trait]
    impl CameraStream for FakeStream {
        async fn ready(&mut self) -> Result<(), StepError> {
            if self.fail_ready {
                Err(StepError::ResourceUnavailable("no metadata".to_string()))
            } else {
                Ok(())
            }
        }

        fn snapshot(&mut self) -> Result<Frame, StepError> {
            Ok(Frame {
                width: 2,
                height: 2,
                rgba: vec![200; 16],
            })
        }

        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}
