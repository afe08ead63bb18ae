pub mod config;
pub mod error;
pub mod paths;

pub use config::Config;
pub use error::{CaptureError, Result};
pub use paths::{config_search_path, local_config_file, system_config_file, user_config_file};
