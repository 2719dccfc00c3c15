use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("capture stream ended")]
    Ended,
}

/// One grabbed video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            captured_at: Utc::now(),
            width,
            height,
            pixels: vec![0; (width * height) as usize],
        }
    }
}

/// A camera-like source that hands out exclusive capture streams.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

#[async_trait]
pub trait CaptureStream: Send {
    async fn grab_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Stops every track. Must be safe to call more than once.
    fn release(&mut self);
}

/// Scoped ownership of a capture stream: released on every exit path.
pub struct CaptureGuard {
    stream: Option<Box<dyn CaptureStream>>,
}

impl CaptureGuard {
    pub fn new(stream: Box<dyn CaptureStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub async fn grab_frame(&mut self) -> Result<Frame, CaptureError> {
        match self.stream.as_mut() {
            Some(stream) => stream.grab_frame().await,
            None => Err(CaptureError::Ended),
        }
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// In-process camera producing flat grey frames.
///
/// Tracks how many streams are live so callers can verify release.
#[derive(Clone)]
pub struct SyntheticCamera {
    inner: Arc<CameraState>,
    width: u32,
    height: u32,
}

struct CameraState {
    permission_granted: AtomicBool,
    unplugged: AtomicBool,
    live_streams: AtomicUsize,
    opened_total: AtomicUsize,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CameraState {
                permission_granted: AtomicBool::new(true),
                unplugged: AtomicBool::new(false),
                live_streams: AtomicUsize::new(0),
                opened_total: AtomicUsize::new(0),
            }),
            width: 64,
            height: 48,
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.inner.permission_granted.store(granted, Ordering::SeqCst);
    }

    /// Simulates the device disappearing; open streams end on their next grab.
    pub fn unplug(&self) {
        self.inner.unplugged.store(true, Ordering::SeqCst);
    }

    pub fn live_streams(&self) -> usize {
        self.inner.live_streams.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.inner.opened_total.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCamera {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if !self.inner.permission_granted.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied("camera access was refused".into()));
        }
        if self.inner.unplugged.load(Ordering::SeqCst) {
            return Err(CaptureError::Unavailable("no camera connected".into()));
        }

        self.inner.live_streams.fetch_add(1, Ordering::SeqCst);
        self.inner.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticStream {
            camera: Arc::clone(&self.inner),
            width: self.width,
            height: self.height,
            live: true,
        }))
    }
}

struct SyntheticStream {
    camera: Arc<CameraState>,
    width: u32,
    height: u32,
    live: bool,
}

#[async_trait]
impl CaptureStream for SyntheticStream {
    async fn grab_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.live || self.camera.unplugged.load(Ordering::SeqCst) {
            return Err(CaptureError::Ended);
        }
        let mut frame = Frame::blank(self.width, self.height);
        frame.pixels.fill(128);
        Ok(frame)
    }

    fn release(&mut self) {
        if self.live {
            self.live = false;
            self.camera.live_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let camera = SyntheticCamera::new();
        let stream = camera.open().await.unwrap();
        let mut guard = CaptureGuard::new(stream);
        assert_eq!(camera.live_streams(), 1);

        let frame = guard.grab_frame().await.unwrap();
        assert_eq!(frame.pixels.len(), 64 * 48);

        drop(guard);
        assert_eq!(camera.live_streams(), 0);
    }

    #[tokio::test]
    async fn explicit_release_is_not_doubled_by_drop() {
        let camera = SyntheticCamera::new();
        let guard = CaptureGuard::new(camera.open().await.unwrap());
        guard.release();
        assert_eq!(camera.live_streams(), 0);
        assert_eq!(camera.opened_total(), 1);
    }

    #[tokio::test]
    async fn refused_permission_never_opens_a_stream() {
        let camera = SyntheticCamera::new();
        camera.set_permission(false);

        let err = camera.open().await.err().unwrap();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert_eq!(camera.live_streams(), 0);
    }

    #[tokio::test]
    async fn unplugging_ends_open_streams() {
        let camera = SyntheticCamera::new();
        let mut guard = CaptureGuard::new(camera.open().await.unwrap());
        camera.unplug();

        assert_eq!(guard.grab_frame().await.unwrap_err(), CaptureError::Ended);
    }
}
