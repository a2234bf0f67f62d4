//! Work queue operations (C2). `position` is the single ordering key;
//! `added_at` and `id` are tie-breakers.

use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::Catalog;
use crate::model::QueueItem;

fn row_to_queue_item(row: &Row) -> rusqlite::Result<QueueItem> {
    Ok(QueueItem {
        id: row.get("id")?,
        series_id: row.get("series_id")?,
        series_url: row.get("series_url")?,
        position: row.get("position")?,
        added_at: row.get("added_at")?,
    })
}

impl Catalog {
    /// Refuses if the series is already complete or already queued; assigns
    /// `position = max(position) + 1`.
    pub fn queue_add(&self, series_id: i64) -> Result<Option<i64>, anyhow::Error> {
        let conn = self.conn()?;

        let series_complete: Option<bool> = conn
            .query_row("SELECT complete FROM series WHERE id = ?1", [series_id], |row| {
                row.get::<_, i64>(0).map(|value| value != 0)
            })
            .optional()?;

        let Some(complete) = series_complete else {
            anyhow::bail!("series {series_id} does not exist");
        };
        if complete {
            return Ok(None);
        }

        let already_queued: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM queue WHERE series_id = ?1)",
            [series_id],
            |row| row.get(0),
        )?;
        if already_queued {
            return Ok(None);
        }

        let series_url: String = conn.query_row("SELECT url FROM series WHERE id = ?1", [series_id], |row| row.get(0))?;
        let next_position: i64 = conn.query_row("SELECT COALESCE(MAX(position), 0) + 1 FROM queue", [], |row| row.get(0))?;

        conn.execute(
            "INSERT INTO queue (series_id, series_url, position, added_at) VALUES (?1, ?2, ?3, ?4)",
            params![series_id, series_url, next_position, Utc::now()],
        )?;

        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn queue_list(&self) -> Result<Vec<QueueItem>, anyhow::Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM queue ORDER BY position ASC, added_at ASC, id ASC")?;
        let rows = stmt.query_map([], row_to_queue_item)?;
        rows.collect::<Result<Vec<_>, _>>().context("failed to list queue")
    }

    pub fn queue_clear(&self) -> Result<(), anyhow::Error> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM queue", [])?;
        Ok(())
    }

    pub fn queue_delete(&self, queue_id: i64) -> Result<bool, anyhow::Error> {
        let conn = self.conn()?;
        let affected = conn.execute("DELETE FROM queue WHERE id = ?1", [queue_id])?;
        Ok(affected > 0)
    }

    pub fn queue_delete_by_series_id(&self, series_id: i64) -> Result<(), anyhow::Error> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM queue WHERE series_id = ?1", [series_id])?;
        Ok(())
    }

    /// Assigns positions `1..N` in the given order; any remaining items keep
    /// their relative order, continuing from `N + 1`.
    pub fn queue_reorder(&self, ordered_queue_ids: &[i64]) -> Result<(), anyhow::Error> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for (index, queue_id) in ordered_queue_ids.iter().enumerate() {
            tx.execute(
                "UPDATE queue SET position = ?2 WHERE id = ?1",
                params![queue_id, index as i64 + 1],
            )?;
        }

        let remaining: Vec<i64> = {
            let placeholders = ordered_queue_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let sql = format!(
                "SELECT id FROM queue WHERE id NOT IN ({placeholders}) ORDER BY position ASC, added_at ASC, id ASC"
            );
            let mut stmt = tx.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = ordered_queue_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(params.as_slice(), |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut next_position = ordered_queue_ids.len() as i64 + 1;
        for queue_id in remaining {
            tx.execute("UPDATE queue SET position = ?2 WHERE id = ?1", params![queue_id, next_position])?;
            next_position += 1;
        }

        tx.commit()?;
        Ok(())
    }

    /// Removes queue rows whose series is complete or whose url no longer
    /// resolves to an active series.
    pub fn queue_prune_completed(&self) -> Result<(), anyhow::Error> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM queue WHERE series_id IN (SELECT id FROM series WHERE complete = 1)
                OR series_url NOT IN (SELECT url FROM series WHERE deleted = 0)",
            [],
        )?;
        Ok(())
    }

    pub fn queue_get(&self, queue_id: i64) -> Result<Option<QueueItem>, anyhow::Error> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM queue WHERE id = ?1", [queue_id], row_to_queue_item)
            .optional()
            .context("failed to load queue item")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Catalog;

    fn temp_catalog(name: &str) -> Catalog {
        let dir = std::env::temp_dir().join(format!("aniloader-queue-test-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Catalog::open(dir.join("test.db")).unwrap()
    }

    #[test]
    fn queue_determinism_after_reorder() {
        let catalog = temp_catalog("determinism");
        let mut ids = Vec::new();
        for n in 1..=3 {
            let series_id = catalog
                .upsert_series(&format!("https://aniworld.to/anime/stream/show-{n}"), Some("Show"))
                .unwrap();
            ids.push(catalog.queue_add(series_id).unwrap().unwrap());
        }

        let reordered = vec![ids[2], ids[0], ids[1]];
        catalog.queue_reorder(&reordered).unwrap();

        let listed: Vec<i64> = catalog.queue_list().unwrap().into_iter().map(|item| item.id).collect();
        assert_eq!(listed, reordered);

        let series_id = catalog
            .upsert_series("https://aniworld.to/anime/stream/show-4", Some("Show"))
            .unwrap();
        let new_id = catalog.queue_add(series_id).unwrap().unwrap();
        let listed_after: Vec<i64> = catalog.queue_list().unwrap().into_iter().map(|item| item.id).collect();
        assert_eq!(listed_after.last(), Some(&new_id));
    }

    #[test]
    fn queue_add_refuses_duplicate_and_complete_series() {
        let catalog = temp_catalog("refuse");
        let series_id = catalog
            .upsert_series("https://aniworld.to/anime/stream/show", Some("Show"))
            .unwrap();

        assert!(catalog.queue_add(series_id).unwrap().is_some());
        assert!(catalog.queue_add(series_id).unwrap().is_none(), "already queued");

        catalog.queue_clear().unwrap();
        catalog
            .update_series(series_id, &crate::db::series::SeriesUpdate { complete: Some(true), ..Default::default() })
            .unwrap();
        assert!(catalog.queue_add(series_id).unwrap().is_none(), "already complete");
    }
}
