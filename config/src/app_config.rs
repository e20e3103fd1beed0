use directories::ProjectDirs;
use std::{
    env,
    path::PathBuf,
};

const CONFIG_FOLDER_ENV: &str = "HUDDLE_CONFIG";

pub fn get_config_dir() -> PathBuf {
    if let Some(dir) = env::var_os(CONFIG_FOLDER_ENV) {
        PathBuf::from(dir)
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("live", "huddle", "huddle")
}
