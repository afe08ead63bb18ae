use directories::ProjectDirs;
use std::path::PathBuf;

const CONFIG_FILE_NAME: &str = "face-capture.toml";

/// Config file checked into the working tree, used during development.
pub fn local_config_file() -> PathBuf {
    PathBuf::from("configs").join(CONFIG_FILE_NAME)
}

pub fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from("com", "facecapture", "FaceCapture")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/face-capture").join(CONFIG_FILE_NAME)
}

/// Config locations in lookup order.
pub fn config_search_path() -> Vec<PathBuf> {
    let mut paths = vec![local_config_file()];
    if let Some(user) = user_config_file() {
        paths.push(user);
    }
    paths.push(system_config_file());
    paths
}
