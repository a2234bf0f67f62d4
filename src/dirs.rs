//! Resolution of the data folder and the paths derived from it.

use std::path::{Path, PathBuf};

use anyhow::Context;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DB_FILE_NAME: &str = "AniLoader.db";
pub const ALL_LOGS_FILE_NAME: &str = "all_logs.txt";
pub const LAST_RUN_FILE_NAME: &str = "last_run.txt";

/// The default data directory, used when the config doesn't yet specify
/// `data_folder_path` and no `--data-dir` override was passed on the CLI.
pub fn default_data_dir() -> Result<PathBuf, anyhow::Error> {
    let data_dir = dirs::data_dir().map(|path| path.join("aniloader")).or_else(|| {
        std::env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(|path| path.join("aniloader-data")))
    });

    data_dir.context("failed to find a data directory path")
}

pub fn ensure_dir(path: &Path) -> Result<(), anyhow::Error> {
    std::fs::create_dir_all(path).with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn config_file_path(data_folder: &Path) -> PathBuf {
    data_folder.join(CONFIG_FILE_NAME)
}

pub fn db_file_path(data_folder: &Path) -> PathBuf {
    data_folder.join(DB_FILE_NAME)
}

pub fn all_logs_file_path(data_folder: &Path) -> PathBuf {
    data_folder.join(ALL_LOGS_FILE_NAME)
}

pub fn last_run_file_path(data_folder: &Path) -> PathBuf {
    data_folder.join(LAST_RUN_FILE_NAME)
}
