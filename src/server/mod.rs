//! Control surface (C8): axum router, shared app state, and the HTTP error
//! type. `AppError` is grounded on `dog4ik/media-server`'s
//! `app_state::AppError` — a `{message, kind}` struct with a `From<anyhow::Error>`
//! impl and an `IntoResponse` mapping `kind` to a status code.

pub mod handlers;

use std::fmt;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::config::{Config, ConfigStore};
use crate::db::Catalog;
use crate::engine::Engine;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub config_store: Arc<ConfigStore>,
    pub config: Arc<Mutex<Config>>,
    pub engine: Engine,
    pub data_folder: std::path::PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub message: String,
    pub kind: AppErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    Internal,
    NotFound,
    BadRequest,
    AlreadyRunning,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: AppErrorKind::NotFound }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: AppErrorKind::BadRequest }
    }

    pub fn already_running(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: AppErrorKind::AlreadyRunning }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AppErrorKind::Internal => write!(f, "internal error: {}", self.message),
            AppErrorKind::NotFound => write!(f, "not found: {}", self.message),
            AppErrorKind::BadRequest => write!(f, "bad request: {}", self.message),
            AppErrorKind::AlreadyRunning => write!(f, "already running: {}", self.message),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self { message: format!("{err:#}"), kind: AppErrorKind::Internal }
    }
}

impl From<AppErrorKind> for StatusCode {
    fn from(kind: AppErrorKind) -> Self {
        match kind {
            AppErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            AppErrorKind::NotFound => StatusCode::NOT_FOUND,
            AppErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            AppErrorKind::AlreadyRunning => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status: StatusCode = self.kind.into();
        (status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Wide-open CORS per §4.8: the control surface is consumed by a separately
/// hosted web UI with no fixed origin.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/start_download", get(handlers::start_download).post(handlers::start_download))
        .route("/stop_download", get(handlers::stop_download).post(handlers::stop_download))
        .route("/status", get(handlers::status))
        .route("/config", get(handlers::get_config).post(handlers::set_config))
        .route("/pick_folder", get(handlers::pick_folder).post(handlers::pick_folder))
        .route("/disk", get(handlers::disk))
        .route("/logs", get(handlers::logs))
        .route("/last_run", get(handlers::last_run))
        .route("/database", get(handlers::database))
        .route("/counts", get(handlers::counts))
        .route("/export", post(handlers::export))
        .route("/add_link", post(handlers::add_link))
        .route("/search", post(handlers::search))
        .route("/anime", get(handlers::list_anime).delete(handlers::delete_anime))
        .route("/anime/restore", post(handlers::restore_anime))
        .route("/check", get(handlers::check))
        .route(
            "/queue",
            get(handlers::queue_list).post(handlers::queue_update).delete(handlers::queue_delete),
        )
        .route("/upload_txt", post(handlers::upload_txt))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
