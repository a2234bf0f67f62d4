//! Filesystem layout (C4): base-path derivation, idempotence checks, and the
//! post-download placement pipeline. Grounded on the teacher's own path-safe
//! naming discipline (`dirs.rs`'s directory helpers) generalized from "one
//! fixed download tree" to the config-driven standard/separate split in
//! §4.4.

use std::path::{Path, PathBuf};

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::model::{ContentType, Language};
use crate::scrape::parse::{sanitize_episode_title, sanitize_series_name};

/// Base directory a downloaded file for `(content_type, is_film)` should
/// land under, before the per-series subfolder.
pub fn base_path(config: &Config, content_type: ContentType, is_film: bool) -> PathBuf {
    if config.storage_mode == crate::model::StorageMode::Standard {
        return config.download_path.clone();
    }

    match content_type {
        ContentType::Anime => {
            if is_film && config.anime_separate_movies {
                config
                    .anime_movies_path
                    .clone()
                    .unwrap_or_else(|| config.anime_path.join("Filme"))
            } else {
                config.anime_path.clone()
            }
        }
        ContentType::Series => {
            if is_film && config.serien_separate_movies {
                config
                    .serien_movies_path
                    .clone()
                    .unwrap_or_else(|| config.serien_path.join("Filme"))
            } else {
                config.serien_path.clone()
            }
        }
    }
}

/// `storage_mode == separate AND {content-type}_separate_movies` for the
/// given content type — changes both destination and filename form.
pub fn is_dedicated_movies(config: &Config, content_type: ContentType) -> bool {
    if config.storage_mode != crate::model::StorageMode::Separate {
        return false;
    }
    match content_type {
        ContentType::Anime => config.anime_separate_movies,
        ContentType::Series => config.serien_separate_movies,
    }
}

/// The series' own folder under its base path, sanitized but dot-preserving.
pub fn series_folder(config: &Config, content_type: ContentType, is_film_hint: bool, series_title: &str) -> PathBuf {
    base_path(config, content_type, is_film_hint).join(sanitize_series_name(series_title))
}

fn sibling_hash_variant(folder: &Path) -> Option<PathBuf> {
    let name = folder.file_name()?.to_str()?;
    if name.contains('.') {
        Some(folder.with_file_name(name.replace('.', "#")))
    } else if name.contains('#') {
        Some(folder.with_file_name(name.replace('#', ".")))
    } else {
        None
    }
}

/// Episode/movie naming tokens used both to detect existing files and to
/// locate a freshly-downloaded one.
fn episode_needle(season: u32, episode: u32) -> String {
    format!("S{season:02}E{episode:03}")
}

fn film_needles(episode: u32) -> [String; 2] {
    [format!("Film{episode:02}"), format!("Movie{episode:02}")]
}

/// Naming patterns the downloader's own output carries *before*
/// `rename_downloaded` moves it into its final series-folder location —
/// `Movie {NNN}`/`Movie{NNN}` for films, `Episode {NNN}` for episodes
/// (3-digit), mirroring `AniLoader.py:1426-1438`. Distinct from
/// `film_needles`/`episode_needle`, which are the *final* naming tokens used
/// once a file has already been placed.
fn fresh_probe_patterns(episode: u32, is_film: bool) -> Vec<String> {
    if is_film {
        vec![format!("Movie {episode:03}"), format!("Movie{episode:03}"), format!("Episode {episode:03}")]
    } else {
        vec![format!("Episode {episode:03}")]
    }
}

/// Whether the downloader has freshly placed a file for `(episode, is_film)`
/// directly under `base_path` — the `-o` directory the CLI writes into,
/// before `rename_downloaded` runs. Used by the downloader adapter's
/// verification poll, which must look for the fresh name, not the final one.
pub fn fresh_file_placed(base_path: &Path, episode: u32, is_film: bool) -> bool {
    find_mp4_matching(base_path, &fresh_probe_patterns(episode, is_film)).is_some()
}

/// `already_downloaded(...)`. Searches `series_folder` (and its `.`/`#`
/// sibling, per the migration-period compatibility shim in §9) recursively
/// for a `.mp4` whose name carries the episode/movie naming token. For
/// dedicated-movies layout, movies are searched under the *parent* of the
/// nominal series folder instead.
pub fn already_downloaded(series_folder: &Path, season: u32, episode: u32, is_dedicated_movies: bool) -> bool {
    let is_film = season == 0;
    let search_root = if is_film && is_dedicated_movies {
        series_folder.parent().map(Path::to_path_buf).unwrap_or_else(|| series_folder.to_path_buf())
    } else {
        series_folder.to_path_buf()
    };

    let needles: Vec<String> = if is_film {
        film_needles(episode).to_vec()
    } else {
        vec![episode_needle(season, episode)]
    };

    for root in [Some(search_root.clone()), sibling_hash_variant(&search_root)].into_iter().flatten() {
        if find_mp4_matching(&root, &needles).is_some() {
            return true;
        }
    }
    false
}

fn find_mp4_matching(root: &Path, needles: &[String]) -> Option<PathBuf> {
    if !root.is_dir() {
        return None;
    }

    let walker = walkdir(root);
    for path in walker {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.to_ascii_lowercase().ends_with(".mp4") {
            continue;
        }
        if needles.iter().any(|needle| name.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())) {
            return Some(path);
        }
    }
    None
}

/// Minimal recursive `.mp4` walk; the teacher's dependency set has no
/// `walkdir`, so this stays a small hand-rolled stack-based traversal.
fn walkdir(root: &Path) -> Vec<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files
}

/// `classify_language(file)`. Absence of a suffix marker means German Dub.
pub fn classify_language(file_name: &str) -> Language {
    let markers: &[(&str, Language)] = &[
        ("[Sub]", Language::GermanSub),
        ("[English Dub]", Language::EnglishDub),
        ("[English Sub]", Language::EnglishSub),
    ];

    for (marker, language) in markers {
        if file_name.contains(marker) {
            return *language;
        }
    }
    Language::GermanDub
}

/// One locally present episode/movie file discovered by `local_episodes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEpisode {
    pub season: u32,
    pub episode: u32,
    pub language: Language,
}

static EPISODE_NEEDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)S(\d{2})E(\d{3})").unwrap());
static FILM_NEEDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:Film|Movie)(\d{2,3})").unwrap());

/// Exhaustively discovers every locally present episode/movie by walking the
/// series folder (and its dedicated-movies sibling, when applicable) rather
/// than bounding by recorded progress — full-check's reclassification pass
/// (§4.7 part a) must consider "every existing local file", not just the
/// range the catalog currently knows about.
pub fn local_episodes(series_folder: &Path, is_dedicated_movies: bool) -> Vec<LocalEpisode> {
    let mut found = Vec::new();

    for root in [Some(series_folder.to_path_buf()), sibling_hash_variant(series_folder)].into_iter().flatten() {
        for path in walkdir(&root) {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !name.to_ascii_lowercase().ends_with(".mp4") {
                continue;
            }
            if let Some(caps) = EPISODE_NEEDLE_RE.captures(name) {
                let season: u32 = caps[1].parse().unwrap_or(0);
                let episode: u32 = caps[2].parse().unwrap_or(0);
                found.push(LocalEpisode { season, episode, language: classify_language(name) });
            } else if let Some(caps) = FILM_NEEDLE_RE.captures(name) {
                let episode: u32 = caps[1].parse().unwrap_or(0);
                found.push(LocalEpisode { season: 0, episode, language: classify_language(name) });
            }
        }
    }

    if is_dedicated_movies {
        if let Some(parent) = series_folder.parent() {
            for path in walkdir(parent) {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
                if !name.to_ascii_lowercase().ends_with(".mp4") {
                    continue;
                }
                if let Some(caps) = FILM_NEEDLE_RE.captures(name) {
                    let episode: u32 = caps[1].parse().unwrap_or(0);
                    found.push(LocalEpisode { season: 0, episode, language: classify_language(name) });
                }
            }
        }
    }

    found.sort_by_key(|e| (e.season, e.episode));
    found.dedup();
    found
}

/// Removes `.mp4`s matching the episode/movie pattern that carry a
/// non-German suffix. Called exclusively right after placing a fresh German
/// version.
pub fn delete_downgrades(
    series_folder: &Path,
    season: u32,
    episode: u32,
    is_dedicated_movies: bool,
) -> Result<(), anyhow::Error> {
    let is_film = season == 0;
    let search_root = if is_film && is_dedicated_movies {
        series_folder.parent().map(Path::to_path_buf).unwrap_or_else(|| series_folder.to_path_buf())
    } else {
        series_folder.to_path_buf()
    };

    let needles: Vec<String> = if is_film {
        film_needles(episode).to_vec()
    } else {
        vec![episode_needle(season, episode)]
    };

    for root in [Some(search_root.clone()), sibling_hash_variant(&search_root)].into_iter().flatten() {
        if !root.is_dir() {
            continue;
        }
        for path in walkdir(&root) {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.to_ascii_lowercase().ends_with(".mp4") {
                continue;
            }
            let matches_episode = needles.iter().any(|needle| name.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()));
            if matches_episode && classify_language(name) != Language::GermanDub {
                std::fs::remove_file(&path).with_context(|| format!("failed to delete downgrade {}", path.display()))?;
            }
        }
    }

    Ok(())
}

/// Windows `MAX_PATH` headroom reserved for the destination path; mirrors
/// the 260-character ceiling in §4.4 even though this service primarily
/// targets Unix hosts — the downloader binary it shells out to may not.
const MAX_PATH: usize = 260;

/// `rename_downloaded(...)`: locate the freshly-produced file under
/// `series_folder` (probing the downloader's own naming patterns), compute
/// the destination, truncate the title so the full path stays under
/// `MAX_PATH`, and move it into place.
pub fn rename_downloaded(
    series_folder: &Path,
    season: u32,
    episode: u32,
    title: Option<&str>,
    language: Language,
    is_dedicated_movies: bool,
    series_title: &str,
) -> Result<PathBuf, anyhow::Error> {
    let is_film = season == 0;

    let probe_patterns = fresh_probe_patterns(episode, is_film);

    let source = [Some(series_folder.to_path_buf()), sibling_hash_variant(series_folder)]
        .into_iter()
        .flatten()
        .find_map(|root| find_mp4_matching(&root, &probe_patterns))
        .context("downloaded file not found under series folder")?;

    let dest_dir = if is_film {
        if is_dedicated_movies {
            match title {
                Some(title) => series_folder
                    .parent()
                    .unwrap_or(series_folder)
                    .join(sanitize_series_name(title)),
                None => series_folder.join(format!("Film{episode:02}")),
            }
        } else {
            series_folder.join("Filme")
        }
    } else {
        series_folder.join(format!("Staffel {season}"))
    };

    std::fs::create_dir_all(&dest_dir).with_context(|| format!("failed to create {}", dest_dir.display()))?;

    let base_name = if is_film {
        if is_dedicated_movies {
            format!("{} - Film{episode:02}", sanitize_series_name(series_title))
        } else {
            format!("Film{episode:02}")
        }
    } else {
        episode_needle(season, episode)
    };

    let suffix = language.suffix();
    let file_name = build_truncated_file_name(&dest_dir, &base_name, title, suffix);
    let dest_path = dest_dir.join(file_name);

    std::fs::rename(&source, &dest_path).with_context(|| format!("failed to move {} to {}", source.display(), dest_path.display()))?;

    if is_dedicated_movies && is_film {
        if let Ok(mut entries) = std::fs::read_dir(series_folder) {
            if entries.next().is_none() {
                let _ = std::fs::remove_dir(series_folder);
            }
        }
    }

    Ok(dest_path)
}

/// Builds `"{base}[ - {title}][ {suffix}].mp4"`, truncating `title` so the
/// full destination path stays under `MAX_PATH`.
fn build_truncated_file_name(dest_dir: &Path, base_name: &str, title: Option<&str>, suffix: &str) -> String {
    let title = title.map(sanitize_episode_title).filter(|t| !t.is_empty());

    let fixed_len = dest_dir.as_os_str().len()
        + 1
        + base_name.len()
        + if suffix.is_empty() { 0 } else { suffix.len() + 1 }
        + ".mp4".len()
        + " - ".len();

    let mut title = title;
    if let Some(t) = &mut title {
        let budget = MAX_PATH.saturating_sub(fixed_len);
        if t.len() > budget {
            t.truncate(t.char_indices().take_while(|(i, _)| *i < budget).last().map(|(i, c)| i + c.len_utf8()).unwrap_or(0));
            *t = t.trim_end().to_string();
        }
    }

    let mut name = base_name.to_string();
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        name.push_str(" - ");
        name.push_str(&title);
    }
    if !suffix.is_empty() {
        name.push(' ');
        name.push_str(suffix);
    }
    name.push_str(".mp4");
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_episodes_discovers_files_beyond_recorded_progress() {
        let dir = std::env::temp_dir().join(format!("aniloader-fs-layout-test-{}-local-episodes", std::process::id()));
        let season_dir = dir.join("Staffel 5");
        std::fs::create_dir_all(&season_dir).unwrap();
        std::fs::write(season_dir.join("S05E012 - Weit weg [Sub].mp4"), b"").unwrap();

        let found = local_episodes(&dir, false);
        assert_eq!(found, vec![LocalEpisode { season: 5, episode: 12, language: Language::GermanSub }]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn classify_language_defaults_to_german_dub() {
        assert_eq!(classify_language("S01E001 - Der Anfang.mp4"), Language::GermanDub);
        assert_eq!(classify_language("S01E001 - Der Anfang [Sub].mp4"), Language::GermanSub);
        assert_eq!(classify_language("S01E001 [English Dub].mp4"), Language::EnglishDub);
    }

    #[test]
    fn naming_round_trips_through_classification() {
        for language in Language::ALL {
            let dest_dir = PathBuf::from("/tmp/Demo Show/Staffel 1");
            let name = build_truncated_file_name(&dest_dir, &episode_needle(1, 1), Some("Der Anfang"), language.suffix());
            assert!(name.starts_with("S01E001"));
            assert_eq!(classify_language(&name), language);
        }
    }

    #[test]
    fn truncates_long_titles_to_keep_path_under_max_path() {
        let dest_dir = PathBuf::from("/tmp/Demo Show/Staffel 1");
        let long_title = "x".repeat(400);
        let name = build_truncated_file_name(&dest_dir, &episode_needle(1, 1), Some(&long_title), "");
        assert!(dest_dir.join(&name).as_os_str().len() < MAX_PATH);
    }

    #[test]
    fn sibling_hash_variant_toggles_dot_and_hash() {
        let dotted = PathBuf::from("/tmp/Demo.Show");
        assert_eq!(sibling_hash_variant(&dotted), Some(PathBuf::from("/tmp/Demo#Show")));
        let hashed = PathBuf::from("/tmp/Demo#Show");
        assert_eq!(sibling_hash_variant(&hashed), Some(PathBuf::from("/tmp/Demo.Show")));
    }
}
