//! Episode pipeline (C6): the eight-step per-`(series, season, episode)`
//! procedure from §4.6. Owns no state of its own — it reads the config
//! snapshot, calls into the scraper/adapter/filesystem layers, and writes
//! back through the snapshot mutex and the catalog store.

use std::path::Path;

use crate::config::Config;
use crate::db::series::SeriesUpdate;
use crate::db::Catalog;
use crate::downloader::{self, AdapterResult};
use crate::fs_layout;
use crate::model::{CurrentDownload, DownloadStatus, Language, Series};
use crate::net;
use crate::scrape::parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Ok,
    Skipped,
    NoStreams,
    Failed,
    NoSpace,
}

pub struct EpisodeContext<'a> {
    pub catalog: &'a Catalog,
    pub config: &'a Config,
    pub snapshot: &'a std::sync::Mutex<CurrentDownload>,
    pub series: &'a Series,
    pub season: u32,
    pub episode: u32,
    pub episode_url: String,
    /// `german_only`: only the German Dub variant is attempted (used by the
    /// `german` mode's recovery pass), per §4.6 step 5.
    pub german_only: bool,
}

/// Reads the free space at `base_path` in gibibytes. `fs4` backs this (no
/// crate in the corpus exposes disk-space queries; picked for the same
/// reason the teacher reaches for small, focused utility crates elsewhere).
pub fn free_space_gb(base_path: &Path) -> Result<f64, anyhow::Error> {
    std::fs::create_dir_all(base_path).ok();
    let available_bytes = fs4::available_space(base_path)?;
    Ok(available_bytes as f64 / 1024f64.powi(3))
}

/// Runs the eight-step pipeline for one episode.
pub async fn run_episode(ctx: EpisodeContext<'_>) -> PipelineOutcome {
    let is_film = ctx.season == 0;

    {
        let mut snapshot = ctx.snapshot.lock().unwrap();
        snapshot.current_season = Some(ctx.season);
        snapshot.current_episode = Some(ctx.episode);
        snapshot.current_is_film = is_film;
        snapshot.episode_started_at = Some(chrono::Utc::now());
    }

    let base_path = fs_layout::base_path(ctx.config, ctx.series.content_type, is_film);
    match free_space_gb(&base_path) {
        Ok(free_gb) if free_gb < ctx.config.min_free_gb => {
            log::warn!(
                "[DiskPressure] {free_gb:.1} GiB free under {} (< {} GiB required)",
                base_path.display(),
                ctx.config.min_free_gb
            );
            ctx.snapshot.lock().unwrap().status = DownloadStatus::KeinSpeicher;
            return PipelineOutcome::NoSpace;
        }
        Err(err) => {
            log::warn!("[DiskPressure] failed to read free space under {}: {err:#}", base_path.display());
            ctx.snapshot.lock().unwrap().status = DownloadStatus::KeinSpeicher;
            return PipelineOutcome::NoSpace;
        }
        Ok(_) => {}
    }

    let series_folder = fs_layout::series_folder(ctx.config, ctx.series.content_type, is_film, &ctx.series.title);
    let dedicated_movies = fs_layout::is_dedicated_movies(ctx.config, ctx.series.content_type);

    if !ctx.german_only && fs_layout::already_downloaded(&series_folder, ctx.season, ctx.episode, dedicated_movies) {
        return PipelineOutcome::Skipped;
    }

    let available = match net::get_text(&ctx.episode_url).await {
        Ok(html) => parse::available_languages(&html, ctx.series.site),
        Err(err) => {
            log::warn!("[NetworkError] failed to fetch {}: {err:#}", ctx.episode_url);
            return PipelineOutcome::NoStreams;
        }
    };
    if available == crate::model::AvailableLanguages::none() {
        return PipelineOutcome::NoStreams;
    }

    let language_order: Vec<Language> = if ctx.german_only {
        vec![Language::GermanDub]
    } else {
        ctx.config.languages.clone()
    };

    let mut downloaded = false;
    let mut german_available = false;

    for language in language_order {
        if !available.has(language) {
            continue;
        }

        let result = downloader::run(&ctx.episode_url, language, &base_path).await;

        match result {
            AdapterResult::NoStreams => return PipelineOutcome::NoStreams,
            AdapterResult::Ok => {
                if !downloader::verify_placed(&base_path, ctx.episode, is_film).await {
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                    continue;
                }

                let title = match net::get_text(&ctx.episode_url).await {
                    Ok(html) => parse::episode_title(&html, false),
                    Err(_) => None,
                };

                let placed = fs_layout::rename_downloaded(
                    &series_folder,
                    ctx.season,
                    ctx.episode,
                    title.as_deref(),
                    language,
                    dedicated_movies,
                    &ctx.series.title,
                );

                match placed {
                    Ok(_) => {
                        if language == Language::GermanDub && ctx.german_only {
                            if let Err(err) = fs_layout::delete_downgrades(&series_folder, ctx.season, ctx.episode, dedicated_movies) {
                                log::warn!("failed to delete downgrades: {err:#}");
                            }
                        }
                        downloaded = true;
                        if language == Language::GermanDub {
                            german_available = true;
                        }
                        break;
                    }
                    Err(err) => {
                        log::warn!("failed to place downloaded file: {err:#}");
                        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                        continue;
                    }
                }
            }
            AdapterResult::LanguageError => {
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                continue;
            }
            AdapterResult::Failed | AdapterResult::Timeout => {
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                continue;
            }
        }
    }

    if !german_available {
        if let Ok(free_gb) = free_space_gb(&base_path) {
            if free_gb >= ctx.config.min_free_gb {
                record_missing_german(ctx.catalog, ctx.series, &ctx.episode_url);
            }
        }
    }

    if downloaded {
        PipelineOutcome::Ok
    } else {
        PipelineOutcome::Failed
    }
}

fn record_missing_german(catalog: &Catalog, series: &Series, episode_url: &str) {
    if series.missing_german.iter().any(|url| url == episode_url) {
        return;
    }
    let mut missing_german = series.missing_german.clone();
    missing_german.push(episode_url.to_string());
    let outcome = catalog.update_series(
        series.id,
        &SeriesUpdate {
            missing_german: Some(missing_german),
            ..Default::default()
        },
    );
    crate::db::or_log_db_error(outcome, "record_missing_german", ());
}

/// `check_deutsch_komplett`: recomputes `german_complete` from the
/// `missing_german` invariant (§3: `german_complete ⇔ missing_german = ∅`).
pub fn recompute_german_complete(catalog: &Catalog, series: &Series) {
    let german_complete = series.missing_german.is_empty();
    if german_complete != series.german_complete {
        let outcome = catalog.update_series(
            series.id,
            &SeriesUpdate { german_complete: Some(german_complete), ..Default::default() },
        );
        crate::db::or_log_db_error(outcome, "recompute_german_complete", ());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_space_reports_gibibytes() {
        let tmp = std::env::temp_dir();
        let free_gb = free_space_gb(&tmp).unwrap();
        assert!(free_gb >= 0.0);
    }
}
