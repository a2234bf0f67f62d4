//! Service bootstrap: wires the CLI args into a running HTTP server. Mirrors
//! the teacher's own binary/library split (`crunchy-cli-core::cli_entrypoint`
//! is the sibling-example shape this follows) — `main.rs` stays a one-line
//! shim and everything else lives here so it's testable as a library.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Context;

use crate::cli::Args;
use crate::config::ConfigStore;
use crate::db::Catalog;
use crate::engine::Engine;
use crate::model::Mode;
use crate::server::{self, AppState};

pub async fn run(args: Args) -> anyhow::Result<()> {
    let data_folder = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => crate::dirs::default_data_dir()?,
    };
    crate::dirs::ensure_dir(&data_folder)?;

    crate::logger::init(&data_folder, args.debug).context("failed to initialize logger")?;

    let config_store = Arc::new(ConfigStore::new(&data_folder));
    let mut config = config_store.load(&data_folder)?;
    config.data_folder_path = data_folder.clone();
    if let Some(port) = args.port {
        config.port = port;
    }

    let catalog = Catalog::open(crate::dirs::db_file_path(&data_folder))?;

    if config.refresh_titles {
        refresh_titles(&catalog).await;
    }

    let port = config.port;
    let config = Arc::new(Mutex::new(config));
    let engine = Engine::new(catalog.clone(), config.clone(), data_folder.clone());

    let autostart_mode = config.lock().unwrap().autostart_mode.as_mode();
    if let Some(mode) = autostart_mode {
        start_autostart(&engine, mode);
    }

    let state = AppState { catalog, config_store, config, engine, data_folder };
    let router = server::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    log::info!("[Server] listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router).await.context("server error")?;

    Ok(())
}

/// SPEC_FULL "Title refresh pass": on startup, if configured, re-fetch and
/// update every active series' title before the server starts accepting
/// traffic.
async fn refresh_titles(catalog: &Catalog) {
    let series = crate::db::or_log_db_error(
        catalog.list_series(&crate::db::series::SeriesFilter::default()),
        "list_series (refresh_titles)",
        Vec::new(),
    );

    log::info!("[Startup] refreshing titles for {} series", series.len());
    for series in series {
        let title = match crate::net::get_text(&series.url).await {
            Ok(html) => crate::scrape::parse::series_title(&html, series.site),
            Err(err) => {
                log::warn!("[Startup] failed to fetch {} while refreshing title: {err:#}", series.url);
                continue;
            }
        };

        let Some(title) = title else { continue };
        if title == series.title {
            continue;
        }

        let outcome = catalog.update_series(
            series.id,
            &crate::db::series::SeriesUpdate { title: Some(title), ..Default::default() },
        );
        crate::db::or_log_db_error(outcome, "update_series (refresh_titles)", ());
    }
}

/// SPEC_FULL "Autostart mode": after the title refresh pass, calls the same
/// entry point `/start_download` uses, in-process.
fn start_autostart(engine: &Engine, mode: Mode) {
    match engine.try_start(mode) {
        Ok(()) => log::info!("[Startup] autostart mode={mode}"),
        Err(err) => log::warn!("[Startup] autostart skipped: {err}"),
    }
}
