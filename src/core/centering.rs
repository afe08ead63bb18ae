use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::{CaptureError, Result};
use crate::core::detector::{BoundingBox, FrameDimensions};

/// Region of the frame, as ratios of its size, that a face centre must fall in.
///
/// Horizontal bounds are tighter than vertical ones: yaw off the camera axis
/// degrades embeddings more than a vertical offset does. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenteringBounds {
    #[serde(default = "default_min_x")]
    pub min_x_ratio: f32,
    #[serde(default = "default_max_x")]
    pub max_x_ratio: f32,
    #[serde(default = "default_min_y")]
    pub min_y_ratio: f32,
    #[serde(default = "default_max_y")]
    pub max_y_ratio: f32,
}

fn default_min_x() -> f32 { 0.2 }
fn default_max_x() -> f32 { 0.8 }
fn default_min_y() -> f32 { 0.1 }
fn default_max_y() -> f32 { 0.9 }

impl Default for CenteringBounds {
    fn default() -> Self {
        Self {
            min_x_ratio: default_min_x(),
            max_x_ratio: default_max_x(),
            min_y_ratio: default_min_y(),
            max_y_ratio: default_max_y(),
        }
    }
}

impl CenteringBounds {
    pub fn validate(&self) -> Result<()> {
        let ratios = [
            self.min_x_ratio,
            self.max_x_ratio,
            self.min_y_ratio,
            self.max_y_ratio,
        ];
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(CaptureError::Config(format!(
                "Centering ratios must be between 0.0 and 1.0, got {:?}", ratios
            )));
        }
        if self.min_x_ratio >= self.max_x_ratio || self.min_y_ratio >= self.max_y_ratio {
            return Err(CaptureError::Config(
                "Centering minimum ratios must be below their maximums".to_string()
            ));
        }
        Ok(())
    }
}

/// Which side of the accepted region the face centre fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    Left,
    Right,
    Up,
    Down,
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self {
            Offset::Left => "left",
            Offset::Right => "right",
            Offset::Up => "high",
            Offset::Down => "low",
        };
        write!(f, "{}", side)
    }
}

impl Offset {
    /// Which way the user has to move to bring the face back into the band.
    pub fn correction(&self) -> &'static str {
        match self {
            Offset::Left => "right",
            Offset::Right => "left",
            Offset::Up => "down",
            Offset::Down => "up",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CenteringEvaluator {
    bounds: CenteringBounds,
}

impl CenteringEvaluator {
    pub fn new(bounds: CenteringBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &CenteringBounds {
        &self.bounds
    }

    /// A box whose centre is not a finite point is never centered.
    pub fn is_centered(&self, bbox: &BoundingBox, frame: FrameDimensions) -> Result<bool> {
        let offsets = self.offsets(bbox, frame)?;
        let (cx, cy) = bbox.center();
        Ok(offsets.is_empty() && cx.is_finite() && cy.is_finite())
    }

    /// Every axis on which the face centre lies outside the accepted region.
    /// Empty means centered.
    pub fn offsets(&self, bbox: &BoundingBox, frame: FrameDimensions) -> Result<Vec<Offset>> {
        if frame.width == 0 || frame.height == 0 {
            return Err(CaptureError::InvalidFrame {
                width: frame.width,
                height: frame.height,
            });
        }

        let (cx, cy) = bbox.center();
        let width = frame.width as f32;
        let height = frame.height as f32;
        let mut offsets = Vec::new();

        if cx < width * self.bounds.min_x_ratio {
            offsets.push(Offset::Left);
        } else if cx > width * self.bounds.max_x_ratio {
            offsets.push(Offset::Right);
        }

        if cy < height * self.bounds.min_y_ratio {
            offsets.push(Offset::Up);
        } else if cy > height * self.bounds.max_y_ratio {
            offsets.push(Offset::Down);
        }

        Ok(offsets)
    }
}

/// Centering check with the default 20-80 % / 10-90 % band.
pub fn is_centered(bbox: &BoundingBox, frame: FrameDimensions) -> Result<bool> {
    CenteringEvaluator::default().is_centered(bbox, frame)
}
