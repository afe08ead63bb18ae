use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::camera::Frame;
use crate::common::{CaptureError, Result};

pub type Embedding = Vec<f32>;

/// Axis-aligned face box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// One face found in a frame. Produced fresh per sample and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub embedding: Embedding,
    pub bounding_box: BoundingBox,
    pub score: f32,
}

/// Face detection + embedding model seen from the capture engine.
///
/// Returns at most one detection per frame. Implementations must fail with
/// [`CaptureError::ProviderNotReady`] rather than return `None` while the
/// underlying model is still loading.
#[async_trait]
pub trait DetectionProvider: Send + Sync {
    fn is_ready(&self) -> bool;

    async fn detect(&self, frame: &Frame, min_score: f32) -> Result<Option<Detection>>;
}

/// What a [`ReplayDetector`] does once every recorded sample has been served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayExhaustion {
    #[default]
    HoldLast,
    Cycle,
}

struct ReplayState {
    samples: Option<Vec<Option<Detection>>>,
    cursor: usize,
}

/// Detection provider that replays a recorded sequence of model outputs.
///
/// The recording is a JSON array where each element is either `null` (no face
/// in that frame) or a detection object.
pub struct ReplayDetector {
    state: Mutex<ReplayState>,
    exhaustion: ReplayExhaustion,
    latency: Duration,
}

impl ReplayDetector {
    pub fn new(samples: Vec<Option<Detection>>) -> Self {
        Self {
            state: Mutex::new(ReplayState {
                samples: Some(samples),
                cursor: 0,
            }),
            exhaustion: ReplayExhaustion::default(),
            latency: Duration::ZERO,
        }
    }

    /// A detector whose model has not been loaded yet.
    pub fn unloaded() -> Self {
        Self {
            state: Mutex::new(ReplayState {
                samples: None,
                cursor: 0,
            }),
            exhaustion: ReplayExhaustion::default(),
            latency: Duration::ZERO,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let samples: Vec<Option<Detection>> = serde_json::from_str(&contents)?;
        tracing::info!("Loaded {} recorded samples from {}", samples.len(), path.display());
        Ok(Self::new(samples))
    }

    pub fn with_exhaustion(mut self, exhaustion: ReplayExhaustion) -> Self {
        self.exhaustion = exhaustion;
        self
    }

    /// Simulated inference time applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn load(&self, samples: Vec<Option<Detection>>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.samples = Some(samples);
        state.cursor = 0;
    }

    fn next_sample(&self) -> Result<Option<Detection>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let cursor = state.cursor;
        let samples = state.samples.as_ref().ok_or(CaptureError::ProviderNotReady)?;

        if samples.is_empty() {
            return Ok(None);
        }

        let index = match self.exhaustion {
            ReplayExhaustion::HoldLast => cursor.min(samples.len() - 1),
            ReplayExhaustion::Cycle => cursor % samples.len(),
        };
        let sample = samples[index].clone();
        state.cursor = cursor.saturating_add(1);
        Ok(sample)
    }
}

#[async_trait]
impl DetectionProvider for ReplayDetector {
    fn is_ready(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.samples.is_some()
    }

    async fn detect(&self, _frame: &Frame, min_score: f32) -> Result<Option<Detection>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        // The model itself drops candidates under its score floor.
        Ok(self.next_sample()?.filter(|d| d.score >= min_score))
    }
}
