use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Frame, FrameSource};
use crate::common::{CaptureError, Result};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Serves pre-recorded images round-robin, one per read.
pub struct StillFrameSource {
    frames: Vec<Frame>,
    next: AtomicUsize,
}

impl StillFrameSource {
    pub fn from_frames(frames: Vec<Frame>) -> Result<Self> {
        if frames.is_empty() {
            return Err(CaptureError::Camera("no frames to serve".to_string()));
        }
        Ok(Self {
            frames,
            next: AtomicUsize::new(0),
        })
    }

    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        // Directory order is unspecified; replay in name order.
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            frames.push(Frame::new(image::open(path)?));
        }

        tracing::info!("Loaded {} frames from {}", frames.len(), dir.display());
        Self::from_frames(frames)
            .map_err(|_| CaptureError::Camera(format!("no images found in {}", dir.display())))
    }
}

impl FrameSource for StillFrameSource {
    fn current_frame(&self) -> Result<Frame> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.frames.len();
        Ok(self.frames[index].clone())
    }
}

/// Blank frames of a fixed size, for running the engine without a camera.
pub struct SyntheticFrameSource {
    frame: Frame,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: Frame::blank(width, height),
        }
    }
}

impl FrameSource for SyntheticFrameSource {
    fn current_frame(&self) -> Result<Frame> {
        Ok(self.frame.clone())
    }
}
