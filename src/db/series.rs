//! Series table operations (C2).

use anyhow::Context;
use rusqlite::{params, OptionalExtension, Row};

use super::Catalog;
use crate::model::{ContentType, Series, Site};

#[derive(Debug, Clone, Default)]
pub struct SeriesFilter {
    pub query: Option<String>,
    pub complete: Option<bool>,
    pub german_complete: Option<bool>,
    /// `None` = active only, `Some(false)` = active only, `Some(true)` =
    /// deleted only, and a separate `include_deleted` flag widens to both.
    pub deleted_only: bool,
    pub include_deleted: bool,
    pub sort_by: Option<String>,
    pub descending: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn row_to_series(row: &Row) -> rusqlite::Result<Series> {
    let site_str: String = row.get("site")?;
    let content_type_str: String = row.get("content_type")?;
    let missing_german_json: String = row.get("missing_german")?;

    Ok(Series {
        id: row.get("id")?,
        url: row.get("url")?,
        title: row.get("title")?,
        site: parse_site(&site_str),
        content_type: parse_content_type(&content_type_str),
        complete: row.get::<_, i64>("complete")? != 0,
        german_complete: row.get::<_, i64>("german_complete")? != 0,
        deleted: row.get::<_, i64>("deleted")? != 0,
        missing_german: serde_json::from_str(&missing_german_json).unwrap_or_default(),
        last_film: row.get::<_, i64>("last_film")? as u32,
        last_season: row.get::<_, i64>("last_season")? as u32,
        last_episode: row.get::<_, i64>("last_episode")? as u32,
    })
}

fn parse_site(value: &str) -> Site {
    match value {
        "s.to" => Site::STo,
        _ => Site::Aniworld,
    }
}

fn site_str(site: Site) -> &'static str {
    match site {
        Site::Aniworld => "aniworld",
        Site::STo => "s.to",
    }
}

fn parse_content_type(value: &str) -> ContentType {
    match value {
        "series" => ContentType::Series,
        _ => ContentType::Anime,
    }
}

fn content_type_str(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Anime => "anime",
        ContentType::Series => "series",
    }
}

impl Catalog {
    /// If `url` exists and is soft-deleted, clears `deleted` (keeping the
    /// id) and optionally updates the title. If it exists and is active,
    /// this is a no-op. Otherwise inserts a fresh row.
    pub fn upsert_series(&self, url: &str, title: Option<&str>) -> Result<i64, anyhow::Error> {
        let conn = self.conn()?;
        let existing: Option<(i64, bool)> = conn
            .query_row("SELECT id, deleted FROM series WHERE url = ?1", [url], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? != 0))
            })
            .optional()?;

        match existing {
            Some((id, true)) => {
                conn.execute(
                    "UPDATE series SET deleted = 0, title = COALESCE(?2, title) WHERE id = ?1",
                    params![id, title],
                )?;
                Ok(id)
            }
            Some((id, false)) => Ok(id),
            None => {
                let site = Site::from_host(
                    url::Url::parse(url)
                        .ok()
                        .and_then(|u| u.host_str().map(str::to_owned))
                        .unwrap_or_default()
                        .as_str(),
                )
                .context("url is not a recognized aniworld.to / s.to series url")?;
                let content_type = site.content_type();
                let resolved_title = title.unwrap_or(url);

                conn.execute(
                    "INSERT INTO series (url, title, site, content_type) VALUES (?1, ?2, ?3, ?4)",
                    params![url, resolved_title, site_str(site), content_type_str(content_type)],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
    }

    pub fn get_series(&self, id: i64) -> Result<Option<Series>, anyhow::Error> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM series WHERE id = ?1", [id], row_to_series)
            .optional()
            .context("failed to load series")
    }

    pub fn get_series_by_url(&self, url: &str) -> Result<Option<Series>, anyhow::Error> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM series WHERE url = ?1", [url], row_to_series)
            .optional()
            .context("failed to load series by url")
    }

    /// Typed partial update. Setting `complete = Some(true)` additionally
    /// prunes this series out of the queue, per §4.2.
    pub fn update_series(&self, id: i64, update: &SeriesUpdate) -> Result<(), anyhow::Error> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if let Some(title) = &update.title {
            tx.execute("UPDATE series SET title = ?2 WHERE id = ?1", params![id, title])?;
        }
        if let Some(complete) = update.complete {
            tx.execute("UPDATE series SET complete = ?2 WHERE id = ?1", params![id, complete as i64])?;
        }
        if let Some(german_complete) = update.german_complete {
            tx.execute(
                "UPDATE series SET german_complete = ?2 WHERE id = ?1",
                params![id, german_complete as i64],
            )?;
        }
        if let Some(missing_german) = &update.missing_german {
            tx.execute(
                "UPDATE series SET missing_german = ?2 WHERE id = ?1",
                params![id, serde_json::to_string(missing_german)?],
            )?;
        }
        if let Some(film) = update.last_film {
            tx.execute("UPDATE series SET last_film = ?2 WHERE id = ?1", params![id, film])?;
        }
        if let Some(season) = update.last_season {
            tx.execute("UPDATE series SET last_season = ?2 WHERE id = ?1", params![id, season])?;
        }
        if let Some(episode) = update.last_episode {
            tx.execute("UPDATE series SET last_episode = ?2 WHERE id = ?1", params![id, episode])?;
        }

        tx.commit()?;

        if update.complete == Some(true) {
            self.queue_delete_by_series_id(id)?;
            self.queue_prune_completed()?;
        }

        Ok(())
    }

    pub fn list_series(&self, filter: &SeriesFilter) -> Result<Vec<Series>, anyhow::Error> {
        let conn = self.conn()?;
        let mut sql = String::from("SELECT * FROM series WHERE 1 = 1");

        if filter.deleted_only {
            sql.push_str(" AND deleted = 1");
        } else if !filter.include_deleted {
            sql.push_str(" AND deleted = 0");
        }
        if filter.complete.is_some() {
            sql.push_str(" AND complete = :complete");
        }
        if filter.german_complete.is_some() {
            sql.push_str(" AND german_complete = :german_complete");
        }
        if filter.query.is_some() {
            sql.push_str(" AND (title LIKE :query OR url LIKE :query)");
        }

        let sort_column = match filter.sort_by.as_deref() {
            Some("title") => "title",
            Some("last_season") => "last_season",
            Some("last_episode") => "last_episode",
            _ => "id",
        };
        sql.push_str(&format!(" ORDER BY {sort_column} {}", if filter.descending { "DESC" } else { "ASC" }));

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = filter.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        let mut stmt = conn.prepare(&sql)?;
        let like_query = filter.query.as_ref().map(|q| format!("%{q}%"));

        let rows = stmt.query_map(
            rusqlite::named_params! {
                ":complete": filter.complete.map(|value| value as i64),
                ":german_complete": filter.german_complete.map(|value| value as i64),
                ":query": like_query,
            },
            row_to_series,
        )?;

        rows.collect::<Result<Vec<_>, _>>().context("failed to list series")
    }

    /// Sets `deleted = 1` and resets progress/missing-German atomically.
    pub fn soft_delete(&self, id: i64) -> Result<(), anyhow::Error> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE series SET deleted = 1, last_film = 0, last_season = 0, last_episode = 0, missing_german = '[]'
             WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Clears `deleted`, resets progress, and optionally re-enqueues.
    pub fn restore(&self, id: i64, enqueue: bool) -> Result<(), anyhow::Error> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE series SET deleted = 0, complete = 0, german_complete = 0, last_film = 0, last_season = 0, last_episode = 0, missing_german = '[]'
             WHERE id = ?1",
            [id],
        )?;
        drop(conn);

        if enqueue {
            self.queue_add(id)?;
        }

        Ok(())
    }

    /// Removes the row and all queue entries referring to it by id or url.
    pub fn hard_delete(&self, id: i64) -> Result<bool, anyhow::Error> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let url: Option<String> = tx
            .query_row("SELECT url FROM series WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;

        let Some(url) = url else {
            tx.commit()?;
            return Ok(false);
        };

        tx.execute("DELETE FROM series WHERE id = ?1", [id])?;
        tx.execute("DELETE FROM queue WHERE series_id = ?1 OR series_url = ?2", params![id, url])?;
        tx.commit()?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeriesUpdate {
    pub title: Option<String>,
    pub complete: Option<bool>,
    pub german_complete: Option<bool>,
    pub missing_german: Option<Vec<String>>,
    /// Each watermark is an independent partial update — callers must set
    /// only the dimension they actually advanced, never all three from a
    /// possibly-stale in-memory `Series` snapshot.
    pub last_film: Option<u32>,
    pub last_season: Option<u32>,
    pub last_episode: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Catalog;

    fn temp_catalog(name: &str) -> Catalog {
        let dir = std::env::temp_dir().join(format!("aniloader-series-test-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Catalog::open(dir.join("test.db")).unwrap()
    }

    #[test]
    fn upsert_is_idempotent_for_active_series() {
        let catalog = temp_catalog("upsert");
        let id1 = catalog
            .upsert_series("https://aniworld.to/anime/stream/demo-show", Some("Demo Show"))
            .unwrap();
        let id2 = catalog
            .upsert_series("https://aniworld.to/anime/stream/demo-show", Some("Renamed"))
            .unwrap();

        assert_eq!(id1, id2);
        let series = catalog.get_series(id1).unwrap().unwrap();
        assert_eq!(series.title, "Demo Show", "active series title is not overwritten");
    }

    #[test]
    fn upsert_restores_a_soft_deleted_series_with_same_id() {
        let catalog = temp_catalog("restore-upsert");
        let id = catalog
            .upsert_series("https://aniworld.to/anime/stream/demo-show", Some("Demo Show"))
            .unwrap();
        catalog.soft_delete(id).unwrap();

        let id2 = catalog
            .upsert_series("https://aniworld.to/anime/stream/demo-show", Some("Demo Show Again"))
            .unwrap();

        assert_eq!(id, id2);
        let series = catalog.get_series(id).unwrap().unwrap();
        assert!(!series.deleted);
        assert_eq!(series.title, "Demo Show Again");
    }

    #[test]
    fn soft_delete_resets_progress() {
        let catalog = temp_catalog("soft-delete");
        let id = catalog
            .upsert_series("https://aniworld.to/anime/stream/demo-show", Some("Demo Show"))
            .unwrap();
        catalog
            .update_series(
                id,
                &SeriesUpdate {
                    last_film: Some(1),
                    last_season: Some(2),
                    last_episode: Some(3),
                    missing_german: Some(vec!["https://x".into()]),
                    ..Default::default()
                },
            )
            .unwrap();

        catalog.soft_delete(id).unwrap();

        let series = catalog.get_series(id).unwrap().unwrap();
        assert!(series.deleted);
        assert_eq!(series.progress(), (0, 0, 0));
        assert!(series.missing_german.is_empty());
    }
}
