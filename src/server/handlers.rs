//! HTTP endpoint handlers (§6). Each function is a thin translation layer
//! between the JSON wire shape and the catalog/config/engine calls; no
//! business logic lives here that isn't already in C1-C7.

use std::collections::HashMap;

use axum::extract::{Multipart, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::series::SeriesFilter;
use crate::model::{Mode, Site};
use crate::scrape::ParsedUrl;

use super::{AppError, AppState};

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Option<String>,
}

async fn dispatch_start(state: &AppState, mode_str: Option<String>) -> Result<Json<Value>, AppError> {
    let mode_str = mode_str.unwrap_or_else(|| "default".to_string());
    let mode: Mode = mode_str.parse().map_err(|_| AppError::bad_request(format!("unknown mode: {mode_str}")))?;

    match state.engine.try_start(mode) {
        Ok(()) => Ok(Json(json!({ "status": "started", "mode": mode.to_string() }))),
        Err(crate::engine::EngineError::AlreadyRunning) => {
            Ok(Json(json!({ "status": "already_running", "mode": mode.to_string() })))
        }
    }
}

pub async fn start_download(
    State(state): State<AppState>,
    Query(query): Query<ModeRequest>,
    body: Option<Json<ModeRequest>>,
) -> Result<Json<Value>, AppError> {
    let mode = body.map(|Json(b)| b.mode).unwrap_or(None).or(query.mode);
    dispatch_start(&state, mode).await
}

pub async fn stop_download(State(state): State<AppState>) -> Json<Value> {
    state.engine.request_stop();
    Json(json!({ "status": "ok", "msg": "stop requested" }))
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.engine.snapshot()).unwrap_or(Value::Null))
}

pub async fn get_config(State(state): State<AppState>) -> Json<Value> {
    let config = state.config.lock().unwrap().clone();
    Json(serde_json::to_value(config).unwrap_or(Value::Null))
}

pub async fn set_config(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, AppError> {
    let Some(Json(patch)) = body else {
        let config = state.config.lock().unwrap().clone();
        return Ok(Json(serde_json::to_value(config).unwrap_or(Value::Null)));
    };

    let mut current = serde_json::to_value(state.config.lock().unwrap().clone()).unwrap_or(Value::Object(Default::default()));
    if let (Value::Object(current_map), Value::Object(patch_map)) = (&mut current, patch) {
        for (key, value) in patch_map {
            current_map.insert(key, value);
        }
    }

    let updated: crate::config::Config = serde_json::from_value(current).map_err(|err| AppError::bad_request(err.to_string()))?;
    state.config_store.write(&updated)?;
    *state.config.lock().unwrap() = updated.clone();

    Ok(Json(serde_json::to_value(updated).unwrap_or(Value::Null)))
}

/// Native folder picker is a desktop-only concern; a headless service
/// degrades it rather than dropping the documented endpoint (SPEC_FULL
/// "SUPPLEMENTED FEATURES").
pub async fn pick_folder() -> Json<Value> {
    Json(json!({ "status": "unsupported", "selected": Value::Null }))
}

pub async fn disk(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let download_path = state.config.lock().unwrap().download_path.clone();
    let free_gb = crate::pipeline::free_space_gb(&download_path)?;
    Ok(Json(json!({ "free_gb": free_gb })))
}

pub async fn logs(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    read_lines(&crate::dirs::all_logs_file_path(&state.data_folder))
}

pub async fn last_run(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    read_lines(&crate::dirs::last_run_file_path(&state.data_folder))
}

fn read_lines(path: &std::path::Path) -> Result<Json<Value>, AppError> {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = text.lines().collect();
    Ok(Json(json!(lines)))
}

#[derive(Debug, Deserialize)]
pub struct DatabaseQuery {
    pub q: Option<String>,
    pub complete: Option<String>,
    pub deutsch: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn database(State(state): State<AppState>, Query(query): Query<DatabaseQuery>) -> Result<Json<Value>, AppError> {
    let mut filter = SeriesFilter { query: query.q, sort_by: query.sort_by, limit: query.limit, offset: query.offset, ..Default::default() };

    match query.complete.as_deref() {
        Some("deleted") => filter.deleted_only = true,
        Some("1") => filter.complete = Some(true),
        Some("0") => filter.complete = Some(false),
        _ => {}
    }
    match query.deutsch.as_deref() {
        Some("1") => filter.german_complete = Some(true),
        Some("0") => filter.german_complete = Some(false),
        _ => {}
    }
    filter.descending = matches!(query.order.as_deref(), Some("desc"));

    let series = state.catalog.list_series(&filter)?;
    Ok(Json(serde_json::to_value(series).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
pub struct CountsQuery {
    pub id: Option<i64>,
    pub title: Option<String>,
}

pub async fn counts(State(state): State<AppState>, Query(query): Query<CountsQuery>) -> Result<Json<Value>, AppError> {
    let series = resolve_series(&state, query.id, query.title.as_deref())?;
    let config = state.config.lock().unwrap().clone();

    let is_dedicated_movies = crate::fs_layout::is_dedicated_movies(&config, series.content_type);
    let series_folder = crate::fs_layout::series_folder(&config, series.content_type, false, &series.title);

    let mut per_season: HashMap<String, u64> = HashMap::new();
    let mut films = 0u64;
    let mut total_episodes = 0u64;

    if series_folder.is_dir() {
        if let Ok(entries) = std::fs::read_dir(&series_folder) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                let count = count_mp4s(&path);
                if name.eq_ignore_ascii_case("filme") {
                    films += count;
                } else if name.to_ascii_lowercase().starts_with("staffel") {
                    per_season.insert(name, count);
                    total_episodes += count;
                }
            }
        }
    }
    if is_dedicated_movies {
        if let Some(parent) = series_folder.parent() {
            let dedicated_name = crate::scrape::parse::sanitize_series_name(&series.title);
            films += count_mp4s(&parent.join(dedicated_name));
        }
    }

    Ok(Json(json!({
        "per_season": per_season,
        "total_seasons": per_season.len(),
        "total_episodes": total_episodes,
        "films": films,
    })))
}

fn count_mp4s(dir: &std::path::Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|entry| entry.path().extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("mp4")).unwrap_or(false))
                .count() as u64
        })
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

pub async fn export(State(state): State<AppState>, Json(body): Json<UrlRequest>) -> Result<Json<Value>, AppError> {
    add_link_inner(&state, &body.url).await
}

pub async fn add_link(State(state): State<AppState>, Json(body): Json<UrlRequest>) -> Result<Json<Value>, AppError> {
    add_link_inner(&state, &body.url).await
}

async fn add_link_inner(state: &AppState, url: &str) -> Result<Json<Value>, AppError> {
    let parsed = ParsedUrl::parse(url).map_err(|err| AppError::bad_request(err.to_string()))?;
    let series_url = parsed.series_url();

    let title = crate::net::get_text(&series_url)
        .await
        .ok()
        .and_then(|html| crate::scrape::parse::series_title(&html, parsed.site));

    let id = state.catalog.upsert_series(&series_url, title.as_deref())?;
    Ok(Json(json!({ "id": id, "url": series_url })))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

pub async fn search(Json(body): Json<SearchRequest>) -> Json<Value> {
    let (aniworld, sto) = tokio::join!(
        crate::scrape::search::search(Site::Aniworld, &body.query),
        crate::scrape::search::search(Site::STo, &body.query),
    );

    let mut results = aniworld;
    results.extend(sto);
    Json(json!({ "results": results }))
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<i64>,
}

pub async fn list_anime(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let series = state.catalog.list_series(&SeriesFilter::default())?;
    Ok(Json(serde_json::to_value(series).unwrap_or(Value::Null)))
}

pub async fn delete_anime(State(state): State<AppState>, Query(query): Query<IdQuery>) -> Result<Json<Value>, AppError> {
    let id = query.id.ok_or_else(|| AppError::bad_request("missing id"))?;
    let deleted = state.catalog.hard_delete(id)?;
    if !deleted {
        return Err(AppError::not_found(format!("series {id} not found")));
    }
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub id: i64,
    #[serde(default)]
    pub queue: bool,
}

pub async fn restore_anime(State(state): State<AppState>, Json(body): Json<RestoreRequest>) -> Result<Json<Value>, AppError> {
    state.catalog.restore(body.id, body.queue)?;
    Ok(Json(json!({ "status": "restored", "id": body.id })))
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub url: String,
}

pub async fn check(State(state): State<AppState>, Query(query): Query<CheckQuery>) -> Result<Json<Value>, AppError> {
    let exists = state
        .catalog
        .get_series_by_url(&query.url)?
        .map(|series| !series.deleted)
        .unwrap_or(false);
    Ok(Json(json!({ "exists": exists })))
}

pub async fn queue_list(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let items = state.catalog.queue_list()?;
    Ok(Json(serde_json::to_value(items).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
pub struct QueueUpdateRequest {
    pub anime_id: Option<i64>,
    pub order: Option<Vec<i64>>,
}

pub async fn queue_update(State(state): State<AppState>, Json(body): Json<QueueUpdateRequest>) -> Result<Json<Value>, AppError> {
    if let Some(order) = body.order {
        state.catalog.queue_reorder(&order)?;
        return Ok(Json(json!({ "status": "reordered" })));
    }
    if let Some(anime_id) = body.anime_id {
        let queue_id = state.catalog.queue_add(anime_id)?;
        return Ok(Json(json!({ "status": if queue_id.is_some() { "queued" } else { "skipped" }, "queue_id": queue_id })));
    }
    Err(AppError::bad_request("expected anime_id or order"))
}

#[derive(Debug, Deserialize)]
pub struct QueueDeleteQuery {
    pub id: Option<i64>,
    pub anime_id: Option<i64>,
}

pub async fn queue_delete(State(state): State<AppState>, Query(query): Query<QueueDeleteQuery>) -> Result<Json<Value>, AppError> {
    if let Some(id) = query.id {
        state.catalog.queue_delete(id)?;
        return Ok(Json(json!({ "status": "deleted" })));
    }
    if let Some(anime_id) = query.anime_id {
        state.catalog.queue_delete_by_series_id(anime_id)?;
        return Ok(Json(json!({ "status": "deleted" })));
    }
    state.catalog.queue_clear()?;
    Ok(Json(json!({ "status": "cleared" })))
}

/// `/upload_txt`: a multipart file of newline-separated series URLs, each
/// upserted the same way `/add_link` upserts a single one.
pub async fn upload_txt(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, AppError> {
    let mut count = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(|err| AppError::bad_request(err.to_string()))? {
        let bytes = field.bytes().await.map_err(|err| AppError::bad_request(err.to_string()))?;
        let text = String::from_utf8_lossy(&bytes);

        for line in text.lines() {
            let url = line.trim();
            if url.is_empty() {
                continue;
            }
            if add_link_inner(&state, url).await.is_ok() {
                count += 1;
            }
        }
    }

    Ok(Json(json!({ "count": count, "msg": format!("added {count} link(s)") })))
}

fn resolve_series(state: &AppState, id: Option<i64>, title: Option<&str>) -> Result<crate::model::Series, AppError> {
    if let Some(id) = id {
        return state.catalog.get_series(id)?.ok_or_else(|| AppError::not_found(format!("series {id} not found")));
    }
    if let Some(title) = title {
        let all = state.catalog.list_series(&SeriesFilter::default())?;
        return all
            .into_iter()
            .find(|series| series.title.eq_ignore_ascii_case(title))
            .ok_or_else(|| AppError::not_found(format!("series {title} not found")));
    }
    Err(AppError::bad_request("expected id or title"))
}
