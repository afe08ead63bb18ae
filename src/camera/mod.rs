pub mod still;

pub use still::{StillFrameSource, SyntheticFrameSource};

use image::DynamicImage;
use std::sync::{Arc, Mutex};

use crate::common::{CaptureError, Result};
use crate::core::detector::FrameDimensions;

/// A single video frame. Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<DynamicImage>,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self { image: Arc::new(image) }
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(DynamicImage::new_rgb8(width, height))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> FrameDimensions {
        FrameDimensions::new(self.image.width(), self.image.height())
    }
}

/// A live video source. Reads never mutate the source.
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Result<Frame>;
}

/// Owns the video source for the lifetime of one capture screen.
///
/// `release` drops the underlying source immediately, even while a sample is
/// in flight; later reads fail with a camera error. Dropping the lease releases
/// it too.
pub struct CameraLease {
    source: Mutex<Option<Box<dyn FrameSource>>>,
}

impl CameraLease {
    pub fn acquire(source: impl FrameSource + 'static) -> Arc<Self> {
        tracing::debug!("Video source acquired");
        Arc::new(Self {
            source: Mutex::new(Some(Box::new(source))),
        })
    }

    pub fn release(&self) {
        let mut guard = self.source.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            tracing::debug!("Video source released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

impl FrameSource for CameraLease {
    fn current_frame(&self) -> Result<Frame> {
        let guard = self.source.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(source) => source.current_frame(),
            None => Err(CaptureError::Camera("video source has been released".to_string())),
        }
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct TrackedSource {
        dropped: Arc<AtomicBool>,
    }

    impl FrameSource for TrackedSource {
        fn current_frame(&self) -> Result<Frame> {
            Ok(Frame::blank(4, 4))
        }
    }

    impl Drop for TrackedSource {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn release_drops_source_while_lease_is_shared() {
        let dropped = Arc::new(AtomicBool::new(false));
        let lease = CameraLease::acquire(TrackedSource { dropped: dropped.clone() });
        let sampler_handle = lease.clone();

        assert!(sampler_handle.current_frame().is_ok());
        lease.release();

        assert!(dropped.load(Ordering::SeqCst));
        assert!(lease.is_released());
        assert!(matches!(sampler_handle.current_frame(), Err(CaptureError::Camera(_))));
    }

    #[test]
    fn frame_reports_dimensions() {
        let frame = Frame::blank(320, 240);
        assert_eq!(frame.dimensions(), FrameDimensions::new(320, 240));
    }
}
