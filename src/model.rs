//! Shared value types used across the catalog store, scraper, pipeline and
//! control surface. Kept free of owning back-pointers: everything addresses
//! its parent by id/number and callers look the parent up on demand.

use std::fmt;

use bitmask_enum::bitmask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the four audio/subtitle variants the scraper can find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "German Dub")]
    GermanDub,
    #[serde(rename = "German Sub")]
    GermanSub,
    #[serde(rename = "English Dub")]
    EnglishDub,
    #[serde(rename = "English Sub")]
    EnglishSub,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::GermanDub,
        Language::GermanSub,
        Language::EnglishDub,
        Language::EnglishSub,
    ];

    /// Filename suffix marking a non-German-Dub variant; German Dub carries none.
    pub fn suffix(self) -> &'static str {
        match self {
            Language::GermanDub => "",
            Language::GermanSub => "[Sub]",
            Language::EnglishDub => "[English Dub]",
            Language::EnglishSub => "[English Sub]",
        }
    }

    pub fn is_german_dub(self) -> bool {
        matches!(self, Language::GermanDub)
    }

    pub fn bit(self) -> AvailableLanguages {
        match self {
            Language::GermanDub => AvailableLanguages::GermanDub,
            Language::GermanSub => AvailableLanguages::GermanSub,
            Language::EnglishDub => AvailableLanguages::EnglishDub,
            Language::EnglishSub => AvailableLanguages::EnglishSub,
        }
    }

    /// Parses a language back out of a classified filename suffix. `None`
    /// carried in the name means German Dub.
    pub fn from_suffix(suffix: Option<&str>) -> Language {
        match suffix {
            Some("[Sub]") => Language::GermanSub,
            Some("[English Dub]") => Language::EnglishDub,
            Some("[English Sub]") => Language::EnglishSub,
            _ => Language::GermanDub,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::GermanDub => "German Dub",
            Language::GermanSub => "German Sub",
            Language::EnglishDub => "English Dub",
            Language::EnglishSub => "English Sub",
        };
        write!(f, "{name}")
    }
}

/// Set of languages a single episode has available, as reported by the scraper.
#[bitmask(u8)]
pub enum AvailableLanguages {
    GermanDub,
    GermanSub,
    EnglishDub,
    EnglishSub,
}

impl AvailableLanguages {
    pub fn has(self, language: Language) -> bool {
        self.contains(language.bit())
    }
}

/// The two streaming sites this service knows how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Aniworld,
    #[serde(rename = "s.to")]
    STo,
}

impl Site {
    /// `aniworld -> anime`, `s.to -> series`, per the data model contract.
    pub fn content_type(self) -> ContentType {
        match self {
            Site::Aniworld => ContentType::Anime,
            Site::STo => ContentType::Series,
        }
    }

    pub fn from_host(host: &str) -> Option<Site> {
        let host = host.trim_start_matches("www.");
        match host {
            "aniworld.to" => Some(Site::Aniworld),
            "s.to" | "serienstream.to" => Some(Site::STo),
            _ => None,
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Aniworld => write!(f, "aniworld"),
            Site::STo => write!(f, "s.to"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Anime,
    Series,
}

/// Where a file ends up: standard single tree, or the separate anime/series
/// split with optional dedicated-movies roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Standard,
    Separate,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::Standard
    }
}

/// One of the five operational strategies of the mode engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Default,
    German,
    New,
    CheckMissing,
    FullCheck,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Default => "default",
            Mode::German => "german",
            Mode::New => "new",
            Mode::CheckMissing => "check-missing",
            Mode::FullCheck => "full-check",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Mode::Default),
            "german" => Ok(Mode::German),
            "new" => Ok(Mode::New),
            "check-missing" => Ok(Mode::CheckMissing),
            "full-check" => Ok(Mode::FullCheck),
            other => anyhow::bail!("unknown mode: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutostartMode {
    None,
    Default,
    German,
    New,
    CheckMissing,
}

impl Default for AutostartMode {
    fn default() -> Self {
        AutostartMode::None
    }
}

impl AutostartMode {
    pub fn as_mode(self) -> Option<Mode> {
        match self {
            AutostartMode::None => None,
            AutostartMode::Default => Some(Mode::Default),
            AutostartMode::German => Some(Mode::German),
            AutostartMode::New => Some(Mode::New),
            AutostartMode::CheckMissing => Some(Mode::CheckMissing),
        }
    }
}

/// One title tracked by the catalog. `missing_german` is the ordered set of
/// episode URLs that were downloaded in a downgrade language because German
/// was unavailable at the time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub site: Site,
    pub content_type: ContentType,
    pub complete: bool,
    pub german_complete: bool,
    pub deleted: bool,
    pub missing_german: Vec<String>,
    pub last_film: u32,
    pub last_season: u32,
    pub last_episode: u32,
}

impl Series {
    pub fn progress(&self) -> (u32, u32, u32) {
        (self.last_film, self.last_season, self.last_episode)
    }
}

/// A position-ordered request that a series should be processed before the
/// bulk catalog iteration resumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub series_id: i64,
    pub series_url: String,
    pub position: i64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Idle,
    Running,
    Finished,
    #[serde(rename = "kein-speicher")]
    KeinSpeicher,
}

/// Process-wide live state of the running mode engine. Mutated only by the
/// engine, except `stop_requested` (control surface) and the `KeinSpeicher`
/// status transition (pipeline, on disk pressure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentDownload {
    pub status: DownloadStatus,
    pub mode: Option<Mode>,
    pub current_index: usize,
    pub current_id: Option<i64>,
    pub current_title: Option<String>,
    pub current_url: Option<String>,
    pub current_season: Option<u32>,
    pub current_episode: Option<u32>,
    pub current_is_film: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub anime_started_at: Option<DateTime<Utc>>,
    pub episode_started_at: Option<DateTime<Utc>>,
    pub stop_requested: bool,
}

impl Default for CurrentDownload {
    fn default() -> Self {
        Self {
            status: DownloadStatus::Idle,
            mode: None,
            current_index: 0,
            current_id: None,
            current_title: None,
            current_url: None,
            current_season: None,
            current_episode: None,
            current_is_film: false,
            started_at: None,
            anime_started_at: None,
            episode_started_at: None,
            stop_requested: false,
        }
    }
}

impl CurrentDownload {
    /// Reset to idle, preserving a `kein-speicher` status set by the pipeline.
    pub fn clear_preserving_disk_pressure(&mut self) {
        let was_kein_speicher = self.status == DownloadStatus::KeinSpeicher;
        *self = CurrentDownload::default();
        if was_kein_speicher {
            self.status = DownloadStatus::KeinSpeicher;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_suffix_round_trips_through_classification() {
        for language in Language::ALL {
            assert_eq!(Language::from_suffix(Some(language.suffix()).filter(|s| !s.is_empty())), language);
        }
    }

    #[test]
    fn site_maps_to_content_type() {
        assert_eq!(Site::Aniworld.content_type(), ContentType::Anime);
        assert_eq!(Site::STo.content_type(), ContentType::Series);
    }

    #[test]
    fn mode_display_matches_http_spelling() {
        assert_eq!(Mode::CheckMissing.to_string(), "check-missing");
        assert_eq!(Mode::FullCheck.to_string(), "full-check");
        assert_eq!("german".parse::<Mode>().unwrap(), Mode::German);
    }

    #[test]
    fn available_languages_bitset() {
        let set = Language::GermanDub.bit() | Language::EnglishSub.bit();
        assert!(set.has(Language::GermanDub));
        assert!(set.has(Language::EnglishSub));
        assert!(!set.has(Language::GermanSub));
    }
}
