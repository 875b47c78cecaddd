use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ecovision_contracts::waste::ImagePayload;
use ecovision_contracts::ScanError;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera, pointed away from the user.
    Environment,
    User,
}

/// Something that can hand out a live video stream.
pub trait CameraBackend {
    fn open(&mut self, facing: FacingMode) -> Result<Box<dyn VideoStream>, ScanError>;
}

pub trait VideoStream {
    fn is_ready(&self) -> bool;
    fn current_frame(&mut self) -> Result<RgbImage, ScanError>;
    fn stop(&mut self);
}

/// Owns at most one camera stream and turns its frames into JPEG data URIs.
pub struct CaptureAdapter {
    backend: Option<Box<dyn CameraBackend>>,
    stream: Option<Box<dyn VideoStream>>,
    jpeg_quality: u8,
}

impl CaptureAdapter {
    pub fn new(backend: Option<Box<dyn CameraBackend>>, jpeg_quality: u8) -> Self {
        Self {
            backend,
            stream: None,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Swaps the camera; any running stream from the old one is released.
    pub fn set_backend(&mut self, backend: Box<dyn CameraBackend>) {
        self.stop_capture();
        self.backend = Some(backend);
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub fn start_capture(&mut self) -> Result<(), ScanError> {
        self.stop_capture();
        let backend = self.backend.as_mut().ok_or_else(|| {
            ScanError::CameraUnavailable("no camera backend configured".to_string())
        })?;
        self.stream = Some(backend.open(FacingMode::Environment)?);
        Ok(())
    }

    pub fn stop_capture(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }

    pub fn capture_frame(&mut self) -> Result<ImagePayload, ScanError> {
        let stream = self.stream.as_mut().ok_or(ScanError::NotReady)?;
        if !stream.is_ready() {
            return Err(ScanError::NotReady);
        }
        let frame = stream.current_frame()?;
        let bytes = encode_jpeg(&frame, self.jpeg_quality)?;
        drop(frame);
        ImagePayload::from_bytes("image/jpeg", &bytes)
    }
}

impl Drop for CaptureAdapter {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

impl std::fmt::Debug for CaptureAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureAdapter")
            .field("has_backend", &self.has_backend())
            .field("active", &self.is_active())
            .field("jpeg_quality", &self.jpeg_quality)
            .finish()
    }
}

fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, ScanError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(frame)
        .map_err(|err| ScanError::CameraUnavailable(format!("frame encode failed: {err}")))?;
    Ok(bytes)
}

/// Serves an image file as a single-frame stream.
#[derive(Debug, Clone)]
pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CameraBackend for StillImageCamera {
    fn open(&mut self, _facing: FacingMode) -> Result<Box<dyn VideoStream>, ScanError> {
        let frame = load_frame(&self.path)?;
        Ok(Box::new(StillImageStream { frame: Some(frame) }))
    }
}

struct StillImageStream {
    frame: Option<RgbImage>,
}

impl VideoStream for StillImageStream {
    fn is_ready(&self) -> bool {
        self.frame.is_some()
    }

    fn current_frame(&mut self) -> Result<RgbImage, ScanError> {
        self.frame.clone().ok_or(ScanError::NotReady)
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}

fn load_frame(path: &Path) -> Result<RgbImage, ScanError> {
    let image = image::open(path).map_err(|err| match &err {
        ImageError::IoError(io) if io.kind() == ErrorKind::PermissionDenied => {
            ScanError::PermissionDenied
        }
        _ => ScanError::CameraUnavailable(format!("{}: {err}", path.display())),
    })?;
    // Transparent pixels are composited onto white.
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    Ok(flattened)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use ecovision_contracts::ScanError;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};

    use super::{CameraBackend, CaptureAdapter, FacingMode, StillImageCamera, VideoStream};

    #[derive(Default)]
    struct Counters {
        opened: Cell<usize>,
        stopped: Cell<usize>,
    }

    struct FakeCamera {
        counters: Rc<Counters>,
        ready: bool,
    }

    struct FakeStream {
        counters: Rc<Counters>,
        ready: bool,
    }

    impl CameraBackend for FakeCamera {
        fn open(&mut self, facing: FacingMode) -> Result<Box<dyn VideoStream>, ScanError> {
            assert_eq!(facing, FacingMode::Environment);
            self.counters.opened.set(self.counters.opened.get() + 1);
            Ok(Box::new(FakeStream {
                counters: self.counters.clone(),
                ready: self.ready,
            }))
        }
    }

    impl VideoStream for FakeStream {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn current_frame(&mut self) -> Result<RgbImage, ScanError> {
            Ok(RgbImage::from_pixel(64, 48, Rgb([20, 160, 60])))
        }

        fn stop(&mut self) {
            self.counters.stopped.set(self.counters.stopped.get() + 1);
        }
    }

    fn adapter(ready: bool) -> (CaptureAdapter, Rc<Counters>) {
        let counters = Rc::new(Counters::default());
        let camera = FakeCamera {
            counters: counters.clone(),
            ready,
        };
        (CaptureAdapter::new(Some(Box::new(camera)), 90), counters)
    }

    #[test]
    fn capture_requires_an_active_ready_stream() {
        let (mut idle, _) = adapter(true);
        assert_eq!(idle.capture_frame(), Err(ScanError::NotReady));

        let (mut warming, _) = adapter(false);
        assert!(warming.start_capture().is_ok());
        assert_eq!(warming.capture_frame(), Err(ScanError::NotReady));
    }

    #[test]
    fn captured_frame_is_native_size_jpeg() -> anyhow::Result<()> {
        let (mut capture, _) = adapter(true);
        capture.start_capture()?;
        let payload = capture.capture_frame()?;
        assert_eq!(payload.mime_type(), "image/jpeg");
        let decoded = image::load_from_memory(&payload.decode())?;
        assert_eq!(decoded.dimensions(), (64, 48));
        Ok(())
    }

    #[test]
    fn restart_releases_previous_stream_and_stop_is_idempotent() -> anyhow::Result<()> {
        let (mut capture, counters) = adapter(true);
        capture.start_capture()?;
        capture.start_capture()?;
        assert_eq!(counters.opened.get(), 2);
        assert_eq!(counters.stopped.get(), 1);

        capture.stop_capture();
        capture.stop_capture();
        assert_eq!(counters.stopped.get(), 2);
        assert!(!capture.is_active());
        Ok(())
    }

    #[test]
    fn drop_releases_stream() -> anyhow::Result<()> {
        let (mut capture, counters) = adapter(true);
        capture.start_capture()?;
        drop(capture);
        assert_eq!(counters.stopped.get(), 1);
        Ok(())
    }

    #[test]
    fn missing_backend_is_camera_unavailable() {
        let mut capture = CaptureAdapter::new(None, 90);
        assert!(matches!(
            capture.start_capture(),
            Err(ScanError::CameraUnavailable(_))
        ));
    }

    #[test]
    fn still_image_camera_serves_file_frames() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("bottle.png");
        let mut source = RgbaImage::from_pixel(10, 6, Rgba([0, 0, 255, 255]));
        source.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        source.save(&path)?;

        let mut capture = CaptureAdapter::new(Some(Box::new(StillImageCamera::new(&path))), 95);
        capture.start_capture()?;
        let payload = capture.capture_frame()?;
        let decoded = image::load_from_memory(&payload.decode())?;
        assert_eq!(decoded.dimensions(), (10, 6));

        capture.stop_capture();
        assert_eq!(capture.capture_frame(), Err(ScanError::NotReady));
        Ok(())
    }

    #[test]
    fn still_image_camera_reports_missing_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut camera = StillImageCamera::new(temp.path().join("absent.jpg"));
        assert!(matches!(
            camera.open(FacingMode::Environment),
            Err(ScanError::CameraUnavailable(_))
        ));
        Ok(())
    }
}
