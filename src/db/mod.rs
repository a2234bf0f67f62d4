//! Catalog store (C2). Every operation opens and closes its own SQLite
//! connection and a short transaction, per §5's "no long-lived handles"
//! policy — grounded on the `BEGIN`/`END`-wrapped save in
//! `Acizza/anup`'s `series::Series::save`, but with one connection per call
//! instead of one shared handle, and `anyhow` instead of `snafu`.

pub mod queue;
pub mod series;

use std::path::PathBuf;

use anyhow::Context;
use rusqlite::Connection;

/// A handle to the catalog database file. Cheap to clone (it only carries a
/// path); every call opens its own connection.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    /// Opens the database, runs the idempotent schema migration, and
    /// reindexes series ids to be contiguous. Call once at startup.
    pub fn open(path: PathBuf) -> Result<Catalog, anyhow::Error> {
        let mut conn = Connection::open(&path).context("failed to open catalog database")?;
        migrate(&conn)?;
        reindex_series(&mut conn)?;
        Ok(Catalog { path })
    }

    pub(crate) fn conn(&self) -> Result<Connection, anyhow::Error> {
        Connection::open(&self.path).context("failed to open catalog database")
    }
}

fn migrate(conn: &Connection) -> Result<(), anyhow::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS series (
            id              INTEGER PRIMARY KEY,
            url             TEXT NOT NULL UNIQUE,
            title           TEXT NOT NULL,
            site            TEXT NOT NULL,
            content_type    TEXT NOT NULL,
            complete        INTEGER NOT NULL DEFAULT 0,
            german_complete INTEGER NOT NULL DEFAULT 0,
            deleted         INTEGER NOT NULL DEFAULT 0,
            missing_german  TEXT NOT NULL DEFAULT '[]',
            last_film       INTEGER NOT NULL DEFAULT 0,
            last_season     INTEGER NOT NULL DEFAULT 0,
            last_episode    INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS queue (
            id         INTEGER PRIMARY KEY,
            series_id  INTEGER NOT NULL,
            series_url TEXT NOT NULL,
            position   INTEGER NOT NULL DEFAULT 0,
            added_at   TEXT NOT NULL
        );",
    )?;

    // Idempotent: older databases created before `position` existed get the
    // column added and backfilled by insertion order.
    if conn.prepare("SELECT position FROM queue LIMIT 1").is_err() {
        conn.execute("ALTER TABLE queue ADD COLUMN position INTEGER NOT NULL DEFAULT 0", [])?;
        conn.execute(
            "UPDATE queue SET position = (
                SELECT COUNT(*) FROM queue AS q2
                WHERE q2.added_at < queue.added_at
                   OR (q2.added_at = queue.added_at AND q2.id <= queue.id)
            )",
            [],
        )?;
    }

    Ok(())
}

/// Reindexes the series table so ids are contiguous starting at 1, in one
/// transaction, remapping `queue.series_id` alongside. Inherited
/// architectural decision: other state (in-memory queue mapping) addresses
/// series by id, so holes left by `hard_delete` must be closed on reopen.
fn reindex_series(conn: &mut Connection) -> Result<(), anyhow::Error> {
    let tx = conn.transaction()?;

    let ids: Vec<i64> = {
        let mut stmt = tx.prepare("SELECT id FROM series ORDER BY id")?;
        stmt.query_map([], |row| row.get(0))?.collect::<Result<_, _>>()?
    };

    let needs_reindex = ids.iter().enumerate().any(|(index, id)| *id != index as i64 + 1);
    if !needs_reindex {
        tx.commit()?;
        return Ok(());
    }

    // Shift every id out of the target range first so the subsequent
    // one-by-one renumbering never collides with an id that hasn't moved yet.
    tx.execute("UPDATE series SET id = -id - 1000000000", [])?;

    for (index, old_id) in ids.iter().enumerate() {
        let new_id = index as i64 + 1;
        let shifted = -old_id - 1_000_000_000;
        tx.execute("UPDATE series SET id = ?1 WHERE id = ?2", rusqlite::params![new_id, shifted])?;
        tx.execute(
            "UPDATE queue SET series_id = ?1 WHERE series_id = ?2",
            rusqlite::params![new_id, old_id],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Logs `[DB-ERROR]` and returns `default` on failure, so callers at the
/// mode-engine / pipeline layer never propagate a DB failure upward — they
/// skip to the next item instead, per §4.2's failure semantics.
pub fn or_log_db_error<T>(result: Result<T, anyhow::Error>, what: &str, default: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            log::error!("[DB-ERROR] {what}: {err:#}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reindex_closes_holes_and_remaps_queue() {
        let dir = std::env::temp_dir().join(format!("aniloader-db-test-{}-reindex", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let db_path = dir.join("test.db");

        {
            let conn = Connection::open(&db_path).unwrap();
            migrate(&conn).unwrap();
            conn.execute_batch(
                "INSERT INTO series (id, url, title, site, content_type) VALUES
                    (3, 'https://aniworld.to/anime/stream/a', 'A', 'aniworld', 'anime'),
                    (7, 'https://aniworld.to/anime/stream/b', 'B', 'aniworld', 'anime'),
                    (9, 'https://aniworld.to/anime/stream/c', 'C', 'aniworld', 'anime');
                 INSERT INTO queue (series_id, series_url, position, added_at) VALUES
                    (7, 'https://aniworld.to/anime/stream/b', 1, '2024-01-01T00:00:00Z');",
            )
            .unwrap();
        }

        let catalog = Catalog::open(db_path.clone()).unwrap();
        let conn = catalog.conn().unwrap();

        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM series ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec![1, 2, 3]);

        let remapped_series_id: i64 = conn
            .query_row("SELECT series_id FROM queue WHERE series_url = ?1", ["https://aniworld.to/anime/stream/b"], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(remapped_series_id, 2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
