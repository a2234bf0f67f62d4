//! Search proxy (`search(provider, keyword)`, §4.3) plus the JSON-repair
//! transform for the origin's occasionally-truncated autocomplete payload
//! (SPEC_FULL "SUPPLEMENTED FEATURES", grounded on
//! `original_source/aniworld-code/search.py`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Site;
use crate::net;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub cover: Option<String>,
    pub year: Option<String>,
    pub provider: Site,
}

/// Runs the origin's autocomplete endpoint for one site and parses the
/// (possibly truncated) JSON response. Never fails outward with a 500: a
/// still-broken payload after repair yields an empty result list.
pub async fn search(provider: Site, keyword: &str) -> Vec<SearchResult> {
    let endpoint = match provider {
        Site::Aniworld => format!("https://aniworld.to/ajax/seriesSearch?keyword={}", urlencode(keyword)),
        Site::STo => format!("https://s.to/ajax/seriesSearch?keyword={}", urlencode(keyword)),
    };

    let Ok(body) = net::get_text(&endpoint).await else {
        return Vec::new();
    };

    parse_search_response(&body, provider)
}

fn parse_search_response(body: &str, provider: Site) -> Vec<SearchResult> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => match serde_json::from_str(&repair_truncated_json(body)) {
            Ok(value) => value,
            Err(_) => return Vec::new(),
        },
    };

    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let title = entry.get("title")?.as_str()?.to_string();
            let link = entry.get("link")?.as_str()?.to_string();
            let base = provider.base_url().trim_end_matches("/stream");
            Some(SearchResult {
                title,
                url: format!("{base}/stream/{link}"),
                cover: entry.get("cover").and_then(|v| v.as_str()).map(str::to_string),
                year: entry.get("productionYear").and_then(|v| v.as_str()).map(str::to_string),
                provider,
            })
        })
        .collect()
}

/// Best-effort repair of a truncated JSON array: strips a dangling trailing
/// comma before EOF, and closes any object/array brackets left open when the
/// origin cut the response off mid-entry.
fn repair_truncated_json(body: &str) -> String {
    let trimmed = body.trim_end();
    let mut repaired = trimmed.trim_end_matches(',').to_string();

    let mut depth_objects = 0i32;
    let mut depth_arrays = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for ch in repaired.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth_objects += 1,
            '}' if !in_string => depth_objects -= 1,
            '[' if !in_string => depth_arrays += 1,
            ']' if !in_string => depth_arrays -= 1,
            _ => {}
        }
    }

    if in_string {
        repaired.push('"');
    }
    for _ in 0..depth_objects.max(0) {
        repaired.push('}');
    }
    for _ in 0..depth_arrays.max(0) {
        repaired.push(']');
    }

    repaired
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let body = r#"[{"title":"Demo Show","link":"demo-show","cover":"c.jpg","productionYear":"2021"}]"#;
        let results = parse_search_response(body, Site::Aniworld);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Demo Show");
        assert_eq!(results[0].url, "https://aniworld.to/anime/stream/demo-show");
    }

    #[test]
    fn repairs_trailing_comma_and_missing_bracket() {
        let truncated = r#"[{"title":"Demo Show","link":"demo-show"},{"title":"Other"#;
        let results = parse_search_response(truncated, Site::Aniworld);
        assert_eq!(results.len(), 1, "first complete entry should survive repair");
        assert_eq!(results[0].title, "Demo Show");
    }

    #[test]
    fn unrecoverable_payload_yields_empty_list_not_panic() {
        let garbage = "not json at all {{{";
        assert!(parse_search_response(garbage, Site::Aniworld).is_empty());
    }
}
