//! Config store (C1). Grounded on the teacher's own dependency-tree sibling
//! `crunchy-cli-core::utils::config::Config` for the load/write/path shape,
//! adapted from TOML to JSON and from a plain overwrite to an atomic
//! tmp-then-rename write with retry/backoff, per the stricter durability
//! contract this service needs.

use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dirs;
use crate::model::{AutostartMode, Language, StorageMode};

/// Serializes every writer of config.json, matching the "single process-wide
/// write mutex" requirement in §4.1.
static WRITE_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const KNOWN_FIELDS: &[&str] = &[
    "languages",
    "min_free_gb",
    "download_path",
    "storage_mode",
    "anime_path",
    "serien_path",
    "anime_movies_path",
    "serien_movies_path",
    "anime_separate_movies",
    "serien_separate_movies",
    "movies_path",
    "series_path",
    "autostart_mode",
    "refresh_titles",
    "port",
    "data_folder_path",
];

fn default_languages() -> Vec<Language> {
    vec![
        Language::GermanDub,
        Language::GermanSub,
        Language::EnglishDub,
        Language::EnglishSub,
    ]
}

fn default_min_free_gb() -> f64 {
    2.0
}

fn default_port() -> u16 {
    5050
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_languages")]
    pub languages: Vec<Language>,
    #[serde(default = "default_min_free_gb")]
    pub min_free_gb: f64,
    #[serde(default)]
    pub download_path: PathBuf,
    #[serde(default)]
    pub storage_mode: StorageMode,
    #[serde(default)]
    pub anime_path: PathBuf,
    #[serde(default)]
    pub serien_path: PathBuf,
    #[serde(default)]
    pub anime_movies_path: Option<PathBuf>,
    #[serde(default)]
    pub serien_movies_path: Option<PathBuf>,
    #[serde(default)]
    pub anime_separate_movies: bool,
    #[serde(default)]
    pub serien_separate_movies: bool,
    /// Legacy keys kept for backward-compatible reads; superseded by the
    /// content-type-specific paths above.
    #[serde(default)]
    pub movies_path: Option<PathBuf>,
    #[serde(default)]
    pub series_path: Option<PathBuf>,
    #[serde(default)]
    pub autostart_mode: AutostartMode,
    #[serde(default)]
    pub refresh_titles: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_folder_path: PathBuf,
}

impl Config {
    pub fn default_record(data_folder_path: PathBuf) -> Config {
        Config {
            languages: default_languages(),
            min_free_gb: default_min_free_gb(),
            download_path: PathBuf::new(),
            storage_mode: StorageMode::Standard,
            anime_path: PathBuf::new(),
            serien_path: PathBuf::new(),
            anime_movies_path: None,
            serien_movies_path: None,
            anime_separate_movies: false,
            serien_separate_movies: false,
            movies_path: None,
            series_path: None,
            autostart_mode: AutostartMode::None,
            refresh_titles: false,
            port: default_port(),
            data_folder_path,
        }
    }
}

/// Reads and atomically persists `config.json` for one data folder.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(data_folder: &std::path::Path) -> Self {
        Self {
            path: dirs::config_file_path(data_folder),
        }
    }

    /// Loads the config, filling in defaults for any missing key and writing
    /// the filled-in record back once. An unparseable file is logged and
    /// treated as absent (defaults are used, nothing is overwritten until
    /// the next explicit write).
    pub fn load(&self, data_folder: &std::path::Path) -> Result<Config, anyhow::Error> {
        if !self.path.exists() {
            let config = Config::default_record(data_folder.to_path_buf());
            self.write(&config)?;
            return Ok(config);
        }

        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                log::warn!(
                    "[ConfigError] {} is unparseable ({err:#}); proceeding with defaults",
                    self.path.display()
                );
                return Ok(Config::default_record(data_folder.to_path_buf()));
            }
        };

        let object = value
            .as_object()
            .cloned()
            .context("config.json root must be a JSON object")?;
        let missing_any = KNOWN_FIELDS.iter().any(|key| !object.contains_key(*key));

        let config: Config = match serde_json::from_value(Value::Object(object)) {
            Ok(config) => config,
            Err(err) => {
                log::warn!(
                    "[ConfigError] {} has an invalid shape ({err:#}); proceeding with defaults",
                    self.path.display()
                );
                Config::default_record(data_folder.to_path_buf())
            }
        };

        if missing_any {
            self.write(&config)?;
        }

        Ok(config)
    }

    /// Writes `config`, preserving any unknown keys already present on disk,
    /// atomically (`.tmp` + rename) with retry-then-direct-write fallback.
    pub fn write(&self, config: &Config) -> Result<(), anyhow::Error> {
        let _guard = WRITE_MUTEX.lock().unwrap();

        let mut merged = self.read_raw_object().unwrap_or_default();
        if let Value::Object(known) = serde_json::to_value(config)? {
            for (key, value) in known {
                merged.insert(key, value);
            }
        }

        let text = serde_json::to_string_pretty(&Value::Object(merged))?;
        self.atomic_write(&text)
    }

    fn read_raw_object(&self) -> Option<Map<String, Value>> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str::<Value>(&text).ok()?.as_object().cloned()
    }

    fn atomic_write(&self, text: &str) -> Result<(), anyhow::Error> {
        let tmp_path = self.path.with_extension("json.tmp");

        for attempt in 0..5u32 {
            let result = std::fs::write(&tmp_path, text).and_then(|_| std::fs::rename(&tmp_path, &self.path));

            match result {
                Ok(()) => return Ok(()),
                Err(err) if is_transient(&err) && attempt < 4 => {
                    thread::sleep(Duration::from_millis(300 * (attempt as u64 + 1)));
                }
                Err(_) => break,
            }
        }

        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write {} (atomic write exhausted retries)", self.path.display()))
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_round_trips_through_json() {
        let config = Config::default_record(PathBuf::from("/tmp/aniloader"));
        let value = serde_json::to_value(&config).unwrap();
        let parsed: Config = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.languages.len(), 4);
    }

    #[test]
    fn missing_keys_are_detected() {
        let object: Map<String, Value> = serde_json::from_str(r#"{"port": 6000}"#).unwrap();
        assert!(KNOWN_FIELDS.iter().any(|key| !object.contains_key(*key)));
    }

    #[test]
    fn load_writes_back_when_keys_are_missing() {
        let dir = std::env::temp_dir().join(format!("aniloader-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dirs::config_file_path(&dir);
        std::fs::write(&config_path, r#"{"port": 6000, "custom_key": "kept"}"#).unwrap();

        let store = ConfigStore::new(&dir);
        let loaded = store.load(&dir).unwrap();
        assert_eq!(loaded.port, 6000);

        let raw = std::fs::read_to_string(&config_path).unwrap();
        assert!(raw.contains("custom_key"));
        assert!(raw.contains("languages"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
