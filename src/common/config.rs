use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::common::error::{CaptureError, Result};
use crate::common::paths;
use crate::core::centering::CenteringBounds;
use crate::core::gate::{ProfileSet, ThresholdProfile};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub centering: CenteringBounds,
    #[serde(default)]
    pub profiles: ProfileSet,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_deadline")]
    pub deadline_seconds: u64,
    #[serde(default = "default_sample_timeout")]
    pub sample_timeout_ms: u64,
}

fn default_deadline() -> u64 { 45 }
fn default_sample_timeout() -> u64 { 5000 }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: default_deadline(),
            sample_timeout_ms: default_sample_timeout(),
        }
    }
}

impl CaptureConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_feedback_interval")]
    pub feedback_interval_ms: u64,
}

fn default_feedback_interval() -> u64 { 1000 }

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            feedback_interval_ms: default_feedback_interval(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoginConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 { 800 }

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_enroll_path")]
    pub enroll_path: String,
    #[serde(default = "default_verify_path")]
    pub verify_path: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String { "http://localhost:5000".to_string() }
fn default_enroll_path() -> String { "/api/face/enroll".to_string() }
fn default_verify_path() -> String { "/api/auth/face-login".to_string() }
fn default_backend_timeout() -> u64 { 15 }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            enroll_path: default_enroll_path(),
            verify_path: default_verify_path(),
            timeout_seconds: default_backend_timeout(),
        }
    }
}

impl Config {
    /// Load the first config found on the search path, or defaults if none exists.
    pub fn load() -> Result<Self> {
        for path in paths::config_search_path() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CaptureError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| CaptureError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(CaptureError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(CaptureError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.capture.deadline_seconds == 0 || self.capture.deadline_seconds > 600 {
            return Err(CaptureError::Config(format!(
                "Capture deadline must be between 1 and 600 seconds, got {}",
                self.capture.deadline_seconds
            )));
        }
        if self.capture.sample_timeout_ms == 0 {
            return Err(CaptureError::Config(
                "Per-sample timeout must be greater than zero".to_string()
            ));
        }

        self.centering.validate()?;

        for (name, profile) in [
            ("feedback", &self.profiles.feedback),
            ("capture", &self.profiles.capture),
            ("login", &self.profiles.login),
        ] {
            validate_profile(name, profile)?;
        }

        if self.enrollment.feedback_interval_ms == 0 {
            return Err(CaptureError::Config(
                "Enrollment feedback interval must be greater than zero".to_string()
            ));
        }
        if self.login.poll_interval_ms == 0 {
            return Err(CaptureError::Config(
                "Login poll interval must be greater than zero".to_string()
            ));
        }

        if self.backend.base_url.trim().is_empty() {
            return Err(CaptureError::Config("Backend base_url must not be empty".to_string()));
        }

        Ok(())
    }
}

fn validate_profile(name: &str, profile: &ThresholdProfile) -> Result<()> {
    if !(0.0..=1.0).contains(&profile.min_score) {
        return Err(CaptureError::Config(format!(
            "Profile '{}' min_score must be between 0.0 and 1.0, got {}",
            name, profile.min_score
        )));
    }
    Ok(())
}
