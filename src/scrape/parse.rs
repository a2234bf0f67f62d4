//! HTML extraction for both site dialects, using the `scraper` crate over
//! already-fetched page text (fetching is `net::get_text`'s job, not this
//! module's — §4.3 says the scraper never performs its own retries, which is
//! easiest to guarantee when parsing is a pure function of a string).

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::model::{AvailableLanguages, Language, Site};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid CSS")
}

/// `series_title(url) -> string?`. Both sites share the same CMS template
/// for the header; aniworld additionally falls back to the `og:title` meta
/// tag for titles the header markup occasionally omits.
pub fn series_title(html: &str, site: Site) -> Option<String> {
    let document = Html::parse_document(html);

    let primary = selector(".series-title > h1 > span");
    if let Some(text) = document.select(&primary).next().map(|el| el.text().collect::<String>()) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    if site == Site::Aniworld {
        let og_title = selector(r#"meta[property="og:title"]"#);
        if let Some(content) = document
            .select(&og_title)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    None
}

/// `season_numbers(url) -> ordered list[string]`. Appends season `0` (the
/// movies pseudo-season) when a "Filme" season-nav entry exists — aniworld
/// only, per §4.3.
pub fn season_numbers(html: &str, site: Site) -> Vec<u32> {
    let document = Html::parse_document(html);
    let nav = selector("#stream > ul:first-of-type > li");

    let mut seasons = Vec::new();
    let mut has_movies = false;

    for item in document.select(&nav) {
        let text = item.text().collect::<String>();
        let text = text.trim();

        if text.eq_ignore_ascii_case("filme") {
            has_movies = true;
            continue;
        }

        if let Ok(number) = text.parse::<u32>() {
            seasons.push(number);
        }
    }

    seasons.sort_unstable();
    seasons.dedup();

    if has_movies && site == Site::Aniworld {
        seasons.insert(0, 0);
    }

    seasons
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedEpisode {
    pub number: u32,
    pub url: String,
}

/// `episodes(url, season) -> ordered list[{number, url}]`. Excludes rows
/// tagged `upcoming`. URLs are synthesized by the caller via
/// `ParsedUrl::episode_url`, not read out of the row — this function only
/// reports which episode numbers actually exist.
pub fn episode_numbers(html: &str, site: Site) -> Vec<u32> {
    let document = Html::parse_document(html);
    let mut numbers = Vec::new();

    match site {
        Site::Aniworld => {
            let row = selector("table.seasonEpisodesList tbody tr");
            let episode_meta = selector(r#"meta[itemprop="episodeNumber"]"#);

            for row_el in document.select(&row) {
                if row_el.value().classes().any(|c| c.eq_ignore_ascii_case("upcoming")) {
                    continue;
                }
                if let Some(meta) = row_el.select(&episode_meta).next() {
                    if let Some(number) = meta.value().attr("content").and_then(|c| c.parse::<u32>().ok()) {
                        numbers.push(number);
                    }
                }
            }
        }
        Site::STo => {
            let row = selector("table tbody tr");
            let cell = selector("th.episode-number-cell");

            for row_el in document.select(&row) {
                if row_el.value().classes().any(|c| c.eq_ignore_ascii_case("upcoming")) {
                    continue;
                }
                if let Some(text) = row_el.select(&cell).next().map(|el| el.text().collect::<String>()) {
                    if let Ok(number) = text.trim().parse::<u32>() {
                        numbers.push(number);
                    }
                }
            }
        }
    }

    numbers.sort_unstable();
    numbers.dedup();
    numbers
}

/// `languages(episode_url) -> set<Language>`. Reads the flag-icon key
/// attribute left on each language toggle and maps it through the
/// site-specific key table from §4.3.
pub fn available_languages(html: &str, site: Site) -> AvailableLanguages {
    let document = Html::parse_document(html);
    let flags = selector(".changeLanguageBox img[data-lang-key]");

    let mut available = AvailableLanguages::none();
    for flag in document.select(&flags) {
        let Some(key) = flag.value().attr("data-lang-key") else {
            continue;
        };
        if let Some(language) = map_language_key(site, key) {
            available |= language.bit();
        }
    }
    available
}

fn map_language_key(site: Site, key: &str) -> Option<Language> {
    let key = key.trim().to_ascii_lowercase();
    match site {
        Site::STo => match key.as_str() {
            "german" => Some(Language::GermanDub),
            "english" => Some(Language::EnglishDub),
            "english-german" => Some(Language::GermanSub),
            _ => None,
        },
        Site::Aniworld => match key.as_str() {
            "german" => Some(Language::GermanDub),
            "english" => Some(Language::EnglishDub),
            "japanese-german" => Some(Language::GermanSub),
            "japanese-english" => Some(Language::EnglishSub),
            _ => None,
        },
    }
}

/// `episode_title(episode_url, prefer_english) -> string?`, sanitized for
/// filesystem safety per §4.4's title-sanitization contract.
pub fn episode_title(html: &str, prefer_english: bool) -> Option<String> {
    let document = Html::parse_document(html);

    let selectors: &[&str] = if prefer_english {
        &[".episodeEnglishTitle", ".episodeGermanTitle"]
    } else {
        &[".episodeGermanTitle", ".episodeEnglishTitle"]
    };

    for css in selectors {
        let sel = selector(css);
        if let Some(text) = document.select(&sel).next().map(|el| el.text().collect::<String>()) {
            let sanitized = sanitize_episode_title(text.trim());
            if !sanitized.is_empty() {
                return Some(sanitized);
            }
        }
    }

    None
}

static MOVIE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[?the movie\]?|\[movie\]|\bmovie\b").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strips `<>:"/\|?*`, the literal "Movie" tokens (episode titles only, per
/// §4.4), and collapses whitespace.
pub fn sanitize_episode_title(title: &str) -> String {
    let stripped: String = title.chars().filter(|c| !r#"<>:"/\|?*"#.contains(*c)).collect();
    let without_movie = MOVIE_TOKEN.replace_all(&stripped, "");
    WHITESPACE.replace_all(without_movie.trim(), " ").trim().to_string()
}

/// Series folder names are sanitized the same way but keep dots, per §4.4.
pub fn sanitize_series_name(name: &str) -> String {
    let stripped: String = name.chars().filter(|c| !r#"<>:"/\|?*"#.contains(*c)).collect();
    WHITESPACE.replace_all(stripped.trim(), " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANIWORLD_SERIES_PAGE: &str = r#"
        <html><body>
        <div class="series-title"><h1><span>Demo Show</span></h1></div>
        <div id="stream">
            <ul><li>1</li><li>2</li><li>Filme</li></ul>
        </div>
        </body></html>
    "#;

    const ANIWORLD_EPISODE_LIST: &str = r#"
        <html><body>
        <table class="seasonEpisodesList"><tbody>
            <tr><td><meta itemprop="episodeNumber" content="1"></td></tr>
            <tr><td><meta itemprop="episodeNumber" content="2"></td></tr>
            <tr class="upcoming"><td><meta itemprop="episodeNumber" content="3"></td></tr>
        </tbody></table>
        </body></html>
    "#;

    const ANIWORLD_EPISODE_PAGE: &str = r#"
        <html><body>
        <div class="changeLanguageBox">
            <img data-lang-key="german" title="Deutsch">
            <img data-lang-key="japanese-german" title="mit deutschen Untertitel">
        </div>
        <div class="episodeGermanTitle">Der Anfang</div>
        <div class="episodeEnglishTitle">The Movie Beginning</div>
        </body></html>
    "#;

    #[test]
    fn extracts_series_title() {
        assert_eq!(series_title(ANIWORLD_SERIES_PAGE, Site::Aniworld), Some("Demo Show".to_string()));
    }

    #[test]
    fn season_numbers_includes_movies_pseudo_season_for_aniworld() {
        assert_eq!(season_numbers(ANIWORLD_SERIES_PAGE, Site::Aniworld), vec![0, 1, 2]);
    }

    #[test]
    fn season_numbers_excludes_movies_for_sto() {
        assert_eq!(season_numbers(ANIWORLD_SERIES_PAGE, Site::STo), vec![1, 2]);
    }

    #[test]
    fn episode_numbers_excludes_upcoming_rows() {
        assert_eq!(episode_numbers(ANIWORLD_EPISODE_LIST, Site::Aniworld), vec![1, 2]);
    }

    #[test]
    fn available_languages_maps_aniworld_keys() {
        let available = available_languages(ANIWORLD_EPISODE_PAGE, Site::Aniworld);
        assert!(available.has(Language::GermanDub));
        assert!(available.has(Language::GermanSub));
        assert!(!available.has(Language::EnglishDub));
    }

    #[test]
    fn episode_title_prefers_german_and_strips_movie_token() {
        assert_eq!(episode_title(ANIWORLD_EPISODE_PAGE, false), Some("Der Anfang".to_string()));
        assert_eq!(episode_title(ANIWORLD_EPISODE_PAGE, true), Some("The Beginning".to_string()));
    }

    #[test]
    fn sanitize_strips_reserved_characters() {
        assert_eq!(sanitize_episode_title(r#"Who: Are<You>?"#), "Who Are You");
    }
}
