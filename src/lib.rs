// Core modules
pub mod core;
pub mod camera;
pub mod service;
pub mod common;

// Re-export commonly used types
pub use common::{Config, CaptureError, Result};
pub use crate::core::{
    AcceptanceGate, BoundingBox, CaptureSession, CaptureStatus, CenteringEvaluator, Detection,
    DetectionProvider, EnrollmentFlow, FrameDimensions, FrameSampler, LoginFlow, LoginOutcome,
    StatusEvent, ThresholdProfile, Verdict,
};
pub use camera::{CameraLease, Frame, FrameSource};
pub use service::{BackendClient, EnrollmentBackend, VerificationBackend};

pub mod config {
    pub use crate::common::config::*;
}
pub mod error {
    pub use crate::common::error::*;
}
