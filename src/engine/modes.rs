//! The five mode procedures (§4.7) plus the `download_films` /
//! `download_seasons` traversal helpers they share. Each procedure walks the
//! work list built by `run_mode`, honoring queue preemption and the
//! stop/disk-pressure interrupts between series and between episodes.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::config::Config;
use crate::db::series::SeriesUpdate;
use crate::db::{self, Catalog};
use crate::model::{CurrentDownload, Mode, Series};
use crate::pipeline::{self, EpisodeContext, PipelineOutcome};
use crate::scrape::ParsedUrl;

/// Three consecutive `NO_STREAMS|FAILED` ends a season; two consecutive
/// empty seasons ends the series traversal, per §4.7.
const SEASON_END_STREAK: u32 = 3;
const SERIES_END_EMPTY_SEASONS: u32 = 2;
const INTER_EPISODE_SLEEP: std::time::Duration = std::time::Duration::from_secs(1);

/// `run(mode)`'s body once the snapshot has been published as `running`:
/// builds the work list (queue first, then the rest of the catalog) and
/// dispatches every series to the mode-specific procedure, re-checking the
/// queue after each one so preemption is depth-first.
pub async fn run_mode(mode: Mode, catalog: &Catalog, config: &Config, snapshot: &Mutex<CurrentDownload>) {
    let mut index = 0usize;
    let mut visited = HashSet::new();

    loop {
        if super::stop_requested(snapshot) {
            log::info!("[Engine] stop requested, ending run");
            return;
        }

        let Some(series) = next_work_item(catalog, &visited) else {
            return;
        };
        visited.insert(series.id);

        super::publish_series(snapshot, index, &series);
        index += 1;

        let outcome = match mode {
            Mode::Default => run_default(catalog, config, snapshot, &series, false).await,
            Mode::New => run_default(catalog, config, snapshot, &series, true).await,
            Mode::German => run_german(catalog, config, snapshot, &series).await,
            Mode::CheckMissing => run_check_missing(catalog, config, snapshot, &series).await,
            Mode::FullCheck => run_full_check(catalog, config, snapshot, &series).await,
        };

        if let Err(err) = outcome {
            log::error!("[Engine] series {} ({}) failed: {err:#}", series.id, series.title);
        }

        db::or_log_db_error(catalog.queue_delete_by_series_id(series.id), "queue_delete_by_series_id", ());

        if super::disk_pressure(snapshot) {
            log::warn!("[Engine] disk pressure, ending run");
            return;
        }
    }
}

/// Queue items always run first (in queue order); once drained, the bulk
/// catalog iteration resumes in id order. `visited` tracks series already
/// dispatched this run so a no-op mode procedure (one that leaves no
/// persisted trace, e.g. `german` on a series with nothing to recover)
/// cannot make this function hand back the same series forever.
fn next_work_item(catalog: &Catalog, visited: &HashSet<i64>) -> Option<Series> {
    let queue = db::or_log_db_error(catalog.queue_list(), "queue_list", Vec::new());
    for item in queue {
        if visited.contains(&item.series_id) {
            continue;
        }
        if let Some(series) = db::or_log_db_error(catalog.get_series(item.series_id), "get_series", None) {
            if !series.deleted {
                return Some(series);
            }
        }
        db::or_log_db_error(catalog.queue_delete(item.id).map(|_| ()), "queue_delete", ());
    }

    let filter = db::series::SeriesFilter { sort_by: Some("id".to_string()), ..Default::default() };
    let all = db::or_log_db_error(catalog.list_series(&filter), "list_series", Vec::new());
    all.into_iter().find(|series| !series.deleted && !visited.contains(&series.id))
}

async fn run_default(
    catalog: &Catalog,
    config: &Config,
    snapshot: &Mutex<CurrentDownload>,
    series: &Series,
    is_new_mode: bool,
) -> Result<(), anyhow::Error> {
    if !is_new_mode && series.complete {
        return Ok(());
    }
    if is_new_mode && !series.complete {
        return Ok(());
    }

    let parsed = ParsedUrl::parse(&series.url)?;
    let mut placed_any = false;

    let films_result = download_films(catalog, config, snapshot, series, &parsed, series.last_film + 1, 1, &mut placed_any).await?;
    if films_result != TraversalEnd::NoMoreContent {
        return Ok(());
    }

    let (start_season, start_episode) = if series.last_season == 0 {
        (1, 1)
    } else {
        (series.last_season, series.last_episode + 1)
    };

    let seasons_result = download_seasons(catalog, config, snapshot, series, &parsed, start_season, start_episode, &mut placed_any).await?;

    if seasons_result != TraversalEnd::NoMoreContent {
        recompute_german_complete(catalog, series.id)?;
        return Ok(());
    }

    if placed_any {
        db::or_log_db_error(
            catalog.update_series(series.id, &SeriesUpdate { complete: Some(true), ..Default::default() }),
            "update_series complete",
            (),
        );
    }

    recompute_german_complete(catalog, series.id)?;
    Ok(())
}

async fn run_german(
    catalog: &Catalog,
    config: &Config,
    snapshot: &Mutex<CurrentDownload>,
    series: &Series,
) -> Result<(), anyhow::Error> {
    if series.missing_german.is_empty() {
        return Ok(());
    }

    let parsed = ParsedUrl::parse(&series.url)?;
    let mut remaining = series.missing_german.clone();

    for episode_url in series.missing_german.clone() {
        if super::stop_requested(snapshot) {
            return Ok(());
        }

        let Some((season, episode)) = parse_season_episode(&parsed, &episode_url) else {
            continue;
        };

        let ctx = EpisodeContext {
            catalog,
            config,
            snapshot,
            series,
            season,
            episode,
            episode_url: episode_url.clone(),
            german_only: true,
        };

        if pipeline::run_episode(ctx).await == PipelineOutcome::Ok {
            remaining.retain(|url| url != &episode_url);
            let is_dedicated_movies = crate::fs_layout::is_dedicated_movies(config, series.content_type);
            let series_folder = crate::fs_layout::series_folder(config, series.content_type, season == 0, &series.title);
            if let Err(err) = crate::fs_layout::delete_downgrades(&series_folder, season, episode, is_dedicated_movies) {
                log::warn!("failed to delete downgrades for {episode_url}: {err:#}");
            }
        }
    }

    db::or_log_db_error(
        catalog.update_series(series.id, &SeriesUpdate { missing_german: Some(remaining), ..Default::default() }),
        "update_series missing_german",
        (),
    );

    recompute_german_complete(catalog, series.id)?;
    Ok(())
}

async fn run_check_missing(
    catalog: &Catalog,
    config: &Config,
    snapshot: &Mutex<CurrentDownload>,
    series: &Series,
) -> Result<(), anyhow::Error> {
    let has_prior_progress = series.last_season > 0 || series.last_episode > 0 || series.last_film > 0;
    if !has_prior_progress && !series.complete {
        return Ok(());
    }

    let parsed = ParsedUrl::parse(&series.url)?;
    let mut placed_any = false;

    download_films(catalog, config, snapshot, series, &parsed, 1, SEASON_END_STREAK, &mut placed_any).await?;
    download_seasons(catalog, config, snapshot, series, &parsed, 1, 1, &mut placed_any).await?;

    recompute_german_complete(catalog, series.id)?;
    Ok(())
}

async fn run_full_check(
    catalog: &Catalog,
    config: &Config,
    snapshot: &Mutex<CurrentDownload>,
    series: &Series,
) -> Result<(), anyhow::Error> {
    let parsed = ParsedUrl::parse(&series.url)?;

    reclassify_local_files(catalog, config, snapshot, series, &parsed).await?;

    let mut placed_any_local_exists = local_content_exists(config, series);
    let films_result = download_films(catalog, config, snapshot, series, &parsed, 1, SEASON_END_STREAK, &mut placed_any_local_exists).await?;
    if films_result != TraversalEnd::NoMoreContent {
        recompute_german_complete(catalog, series.id)?;
        return Ok(());
    }
    let seasons_result = download_seasons(catalog, config, snapshot, series, &parsed, 1, 1, &mut placed_any_local_exists).await?;

    recompute_german_complete(catalog, series.id)?;

    if seasons_result == TraversalEnd::NoMoreContent && placed_any_local_exists {
        db::or_log_db_error(
            catalog.update_series(series.id, &SeriesUpdate { complete: Some(true), ..Default::default() }),
            "update_series complete",
            (),
        );
    }

    Ok(())
}

fn local_content_exists(config: &Config, series: &Series) -> bool {
    let is_dedicated_movies = crate::fs_layout::is_dedicated_movies(config, series.content_type);
    let series_folder = crate::fs_layout::series_folder(config, series.content_type, false, &series.title);
    !crate::fs_layout::local_episodes(&series_folder, is_dedicated_movies).is_empty()
}

/// Part (a) of full-check: for every local file found, classify its
/// language, and if it is a downgrade and German is now available,
/// redownload German and delete the downgrade.
async fn reclassify_local_files(
    catalog: &Catalog,
    config: &Config,
    snapshot: &Mutex<CurrentDownload>,
    series: &Series,
    parsed: &ParsedUrl,
) -> Result<(), anyhow::Error> {
    let is_dedicated_movies = crate::fs_layout::is_dedicated_movies(config, series.content_type);
    let series_folder = crate::fs_layout::series_folder(config, series.content_type, false, &series.title);

    // Exhaustive: walk every locally present file rather than bounding by
    // recorded progress, per §4.7 part (a)'s "every existing local file".
    let locals = crate::fs_layout::local_episodes(&series_folder, is_dedicated_movies);

    for local in locals {
        if local.language == crate::model::Language::GermanDub {
            continue;
        }
        if super::stop_requested(snapshot) {
            return Ok(());
        }

        let episode_url = parsed.episode_url(local.season, local.episode);
        let ctx = EpisodeContext {
            catalog,
            config,
            snapshot,
            series,
            season: local.season,
            episode: local.episode,
            episode_url: episode_url.clone(),
            german_only: true,
        };

        if pipeline::run_episode(ctx).await == PipelineOutcome::Ok {
            if let Err(err) = crate::fs_layout::delete_downgrades(&series_folder, local.season, local.episode, is_dedicated_movies) {
                log::warn!("failed to delete downgrades for {episode_url}: {err:#}");
            }
        }
    }

    Ok(())
}

fn parse_season_episode(parsed: &ParsedUrl, episode_url: &str) -> Option<(u32, u32)> {
    let matched = ParsedUrl::parse(episode_url).ok()?;
    if matched.slug != parsed.slug {
        return None;
    }
    matched.season.and_then(|(season, episode)| episode.map(|episode| (season, episode)))
}

fn recompute_german_complete(catalog: &Catalog, series_id: i64) -> Result<(), anyhow::Error> {
    if let Some(series) = catalog.get_series(series_id)? {
        pipeline::recompute_german_complete(catalog, &series);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraversalEnd {
    NoMoreContent,
    StopRequested,
    DiskPressure,
}

/// `download_films(series, start=last_film+1)`: films are a single
/// unbounded "season 0" sequence. `default`/`new` stop on the very first
/// `NO_STREAMS|FAILED` (§4.7, original `AniLoader.py:1506`); `check-missing`/
/// `full-check` instead tolerate `SEASON_END_STREAK` consecutive misses
/// before concluding there are no more films, per §4.7 part (c).
async fn download_films(
    catalog: &Catalog,
    config: &Config,
    snapshot: &Mutex<CurrentDownload>,
    series: &Series,
    parsed: &ParsedUrl,
    start_film: u32,
    miss_streak_limit: u32,
    placed_any: &mut bool,
) -> Result<TraversalEnd, anyhow::Error> {
    let mut film = start_film.max(1);
    let mut consecutive_misses = 0u32;

    loop {
        if super::stop_requested(snapshot) {
            return Ok(TraversalEnd::StopRequested);
        }

        let episode_url = parsed.episode_url(0, film);
        let ctx = EpisodeContext {
            catalog,
            config,
            snapshot,
            series,
            season: 0,
            episode: film,
            episode_url,
            german_only: false,
        };

        let outcome = pipeline::run_episode(ctx).await;

        if outcome == PipelineOutcome::NoSpace {
            return Ok(TraversalEnd::DiskPressure);
        }

        match outcome {
            PipelineOutcome::Ok | PipelineOutcome::Skipped => {
                consecutive_misses = 0;
                *placed_any |= outcome == PipelineOutcome::Ok;
                update_film_progress(catalog, series.id, film);
            }
            PipelineOutcome::NoStreams | PipelineOutcome::Failed => {
                consecutive_misses += 1;
                if consecutive_misses >= miss_streak_limit {
                    return Ok(TraversalEnd::NoMoreContent);
                }
            }
            PipelineOutcome::NoSpace => unreachable!(),
        }

        film += 1;
        tokio::time::sleep(INTER_EPISODE_SLEEP).await;
    }
}

/// `download_seasons(series, start_season, start_episode)`: outer loop over
/// seasons, inner over episodes. A season ends on three consecutive
/// `NO_STREAMS|FAILED` (but not if the very first attempt in the season
/// fails and a later one recovers — the streak resets on any `OK|SKIPPED`).
/// The series-level traversal ends after two consecutive empty seasons.
async fn download_seasons(
    catalog: &Catalog,
    config: &Config,
    snapshot: &Mutex<CurrentDownload>,
    series: &Series,
    parsed: &ParsedUrl,
    start_season: u32,
    start_episode: u32,
    placed_any: &mut bool,
) -> Result<TraversalEnd, anyhow::Error> {
    let mut season = start_season.max(1);
    let mut consecutive_empty_seasons = 0u32;
    let mut episode_cursor = start_episode.max(1);

    loop {
        if super::stop_requested(snapshot) {
            return Ok(TraversalEnd::StopRequested);
        }

        let episodes_in_season = run_season(catalog, config, snapshot, series, parsed, season, episode_cursor, placed_any).await?;

        match episodes_in_season {
            SeasonOutcome::StopRequested => return Ok(TraversalEnd::StopRequested),
            SeasonOutcome::DiskPressure => return Ok(TraversalEnd::DiskPressure),
            SeasonOutcome::Ended { placed } => {
                if placed == 0 {
                    consecutive_empty_seasons += 1;
                    if consecutive_empty_seasons >= SERIES_END_EMPTY_SEASONS {
                        return Ok(TraversalEnd::NoMoreContent);
                    }
                } else {
                    consecutive_empty_seasons = 0;
                }
            }
        }

        season += 1;
        episode_cursor = 1;
    }
}

enum SeasonOutcome {
    Ended { placed: u32 },
    StopRequested,
    DiskPressure,
}

async fn run_season(
    catalog: &Catalog,
    config: &Config,
    snapshot: &Mutex<CurrentDownload>,
    series: &Series,
    parsed: &ParsedUrl,
    season: u32,
    start_episode: u32,
    placed_any: &mut bool,
) -> Result<SeasonOutcome, anyhow::Error> {
    let mut episode = start_episode;
    let mut consecutive_misses = 0u32;
    let mut placed_in_season = 0u32;

    loop {
        if super::stop_requested(snapshot) {
            return Ok(SeasonOutcome::StopRequested);
        }

        let episode_url = parsed.episode_url(season, episode);
        let ctx = EpisodeContext {
            catalog,
            config,
            snapshot,
            series,
            season,
            episode,
            episode_url,
            german_only: false,
        };

        let outcome = pipeline::run_episode(ctx).await;

        match outcome {
            PipelineOutcome::NoSpace => return Ok(SeasonOutcome::DiskPressure),
            PipelineOutcome::Ok | PipelineOutcome::Skipped => {
                consecutive_misses = 0;
                placed_in_season += 1;
                *placed_any |= outcome == PipelineOutcome::Ok;
                update_episode_progress(catalog, series.id, season, episode);
            }
            PipelineOutcome::NoStreams | PipelineOutcome::Failed => {
                consecutive_misses += 1;
                if consecutive_misses >= SEASON_END_STREAK {
                    return Ok(SeasonOutcome::Ended { placed: placed_in_season });
                }
            }
        }

        episode += 1;
        tokio::time::sleep(INTER_EPISODE_SLEEP).await;
    }
}

/// `download_films` advances only `last_film` — the season/episode
/// watermarks are untouched and must not be clobbered from a stale snapshot.
fn update_film_progress(catalog: &Catalog, series_id: i64, film: u32) {
    db::or_log_db_error(
        catalog.update_series(series_id, &SeriesUpdate { last_film: Some(film), ..Default::default() }),
        "update_series last_film",
        (),
    );
}

/// `download_seasons`/`run_season` advance only `last_season`/`last_episode`.
fn update_episode_progress(catalog: &Catalog, series_id: i64, season: u32, episode: u32) {
    db::or_log_db_error(
        catalog.update_series(
            series_id,
            &SeriesUpdate { last_season: Some(season), last_episode: Some(episode), ..Default::default() },
        ),
        "update_series last_season/last_episode",
        (),
    );
}
