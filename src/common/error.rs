use thiserror::Error;

use crate::core::session::CaptureStatus;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Face model is not loaded yet")]
    ProviderNotReady,

    #[error("Detection provider failed: {0}")]
    Provider(String),

    #[error("Detection did not finish within {0:?}")]
    SampleTimeout(std::time::Duration),

    #[error("Capture deadline of {0:?} has passed")]
    DeadlineExceeded(std::time::Duration),

    #[error("Invalid frame dimensions {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("Cannot {action} while session is {from}")]
    InvalidTransition {
        from: CaptureStatus,
        action: &'static str,
    },

    #[error("Capture session has been disposed")]
    Disposed,

    #[error("Backend rejected request: {0}")]
    BackendRejected(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
