//! Mode engine (C7): owns the `CurrentDownload` snapshot and dispatches one
//! of the five mode procedures on a single dedicated worker. Grounded on the
//! teacher's own single-flight `DownloadManager` (`download.rs`) for the
//! "exactly one worker, gated by a status field" shape, generalized from a
//! progress-channel consumer to the catalog-driven traversal in §4.7.
//!
//! The teacher's worker is a dedicated OS thread; this service runs the
//! engine as a single tokio task instead; the "exactly one instance, gated
//! by `status`" invariant from §5 is what actually matters and is preserved
//! by `Engine::try_start`'s compare-and-set under the snapshot mutex.

pub mod modes;

use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::db::Catalog;
use crate::logger;
use crate::model::{CurrentDownload, DownloadStatus, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    AlreadyRunning,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::AlreadyRunning => write!(f, "a download run is already in progress"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Shared handle cloned into the HTTP layer and into the running task.
#[derive(Clone)]
pub struct Engine {
    catalog: Catalog,
    config: Arc<Mutex<Config>>,
    data_folder: std::path::PathBuf,
    snapshot: Arc<Mutex<CurrentDownload>>,
}

impl Engine {
    pub fn new(catalog: Catalog, config: Arc<Mutex<Config>>, data_folder: std::path::PathBuf) -> Self {
        Self {
            catalog,
            config,
            data_folder,
            snapshot: Arc::new(Mutex::new(CurrentDownload::default())),
        }
    }

    pub fn snapshot(&self) -> CurrentDownload {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn request_stop(&self) {
        self.snapshot.lock().unwrap().stop_requested = true;
    }

    /// `/start_download`'s CAS: refuses a second concurrent run with
    /// `AlreadyRunning`, otherwise publishes `running` and spawns the
    /// traversal as a background task.
    pub fn try_start(&self, mode: Mode) -> Result<(), EngineError> {
        {
            let mut snapshot = self.snapshot.lock().unwrap();
            if snapshot.status == DownloadStatus::Running {
                return Err(EngineError::AlreadyRunning);
            }
            *snapshot = CurrentDownload {
                status: DownloadStatus::Running,
                mode: Some(mode),
                started_at: Some(chrono::Utc::now()),
                ..CurrentDownload::default()
            };
        }

        if let Err(err) = logger::clear_last_run(&self.data_folder) {
            log::warn!("failed to clear last_run.txt: {err:#}");
        }

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(mode).await;
        });

        Ok(())
    }

    async fn run(&self, mode: Mode) {
        log::info!("[Engine] starting mode={mode}");
        let config = self.config.lock().unwrap().clone();

        modes::run_mode(mode, &self.catalog, &config, &self.snapshot).await;

        let mut snapshot = self.snapshot.lock().unwrap();
        let disk_pressure = snapshot.status == DownloadStatus::KeinSpeicher;
        snapshot.clear_preserving_disk_pressure();
        if !disk_pressure {
            snapshot.status = DownloadStatus::Finished;
        }
        log::info!("[Engine] finished mode={mode}");
    }
}

/// Checked before processing each series and each episode, per §5's
/// cooperative-cancellation contract.
pub(crate) fn stop_requested(snapshot: &Mutex<CurrentDownload>) -> bool {
    snapshot.lock().unwrap().stop_requested
}

pub(crate) fn disk_pressure(snapshot: &Mutex<CurrentDownload>) -> bool {
    snapshot.lock().unwrap().status == DownloadStatus::KeinSpeicher
}

pub(crate) fn publish_series(snapshot: &Mutex<CurrentDownload>, index: usize, series: &crate::model::Series) {
    let mut snapshot = snapshot.lock().unwrap();
    snapshot.current_index = index;
    snapshot.current_id = Some(series.id);
    snapshot.current_title = Some(series.title.clone());
    snapshot.current_url = Some(series.url.clone());
    snapshot.anime_started_at = Some(chrono::Utc::now());
}
