use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{
    rewrite_page, ApplyOutcome, ElementOverride, ExtractionGroup, OverrideTable, PageRecord,
    SessionStore,
};

/// Default database location under the platform data directory.
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("Could not find data directory"))?;
    let db_path = data_dir.join("extractor-sidecar").join("sessions.db");

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(db_path)
}

/// SQLite-backed session store. Descriptors are stored as JSON per group.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_default() -> Result<Self> {
        Self::open(&default_db_path()?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS pages (
                page_id TEXT PRIMARY KEY,
                page_name TEXT NOT NULL,
                url TEXT NOT NULL,
                dom_signature TEXT NOT NULL DEFAULT '',
                created TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pages_last_updated ON pages(last_updated DESC);

            CREATE TABLE IF NOT EXISTS extractions (
                page_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                elements TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (page_id, group_id),
                FOREIGN KEY (page_id) REFERENCES pages(page_id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS overrides (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn groups_for_page(conn: &Connection, page_id: &str) -> Result<Vec<ExtractionGroup>> {
        let mut stmt = conn.prepare(
            "SELECT group_id, timestamp, elements FROM extractions WHERE page_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![page_id], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut groups = Vec::new();
        for row in rows {
            let (group_id, timestamp, elements) = row?;
            groups.push(ExtractionGroup {
                group_id,
                timestamp: parse_time(&timestamp)?,
                elements: serde_json::from_str(&elements)?,
            });
        }
        Ok(groups)
    }

    fn read_page(conn: &Connection, page_id: &str) -> Result<Option<PageRecord>> {
        let row = conn
            .query_row(
                r#"
                SELECT page_id, page_name, url, dom_signature, created, last_updated
                FROM pages WHERE page_id = ?1
                "#,
                params![page_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((page_id, page_name, url, dom_signature, created, last_updated)) = row else {
            return Ok(None);
        };
        let extractions = Self::groups_for_page(conn, &page_id)?;
        Ok(Some(PageRecord {
            page_id,
            page_name,
            url,
            dom_signature,
            created: parse_time(&created)?,
            last_updated: parse_time(&last_updated)?,
            extractions,
        }))
    }

    fn write_page(conn: &Connection, page: &PageRecord) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO pages (page_id, page_name, url, dom_signature, created, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(page_id) DO UPDATE SET
                page_name = excluded.page_name,
                url = excluded.url,
                dom_signature = excluded.dom_signature,
                created = excluded.created,
                last_updated = excluded.last_updated
            "#,
            params![
                page.page_id,
                page.page_name,
                page.url,
                page.dom_signature,
                format_time(&page.created),
                format_time(&page.last_updated),
            ],
        )?;
        conn.execute("DELETE FROM extractions WHERE page_id = ?1", params![page.page_id])?;
        for (position, group) in page.extractions.iter().enumerate() {
            conn.execute(
                r#"
                INSERT INTO extractions (page_id, position, group_id, timestamp, elements)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    page.page_id,
                    position as i64,
                    group.group_id,
                    format_time(&group.timestamp),
                    serde_json::to_string(&group.elements)?,
                ],
            )?;
        }
        Ok(())
    }

    fn read_overrides(conn: &Connection) -> Result<OverrideTable> {
        let mut stmt = conn.prepare("SELECT key, data FROM overrides")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut table = OverrideTable::new();
        for row in rows {
            let (key, data) = row?;
            table.insert(key, serde_json::from_str(&data)?);
        }
        Ok(table)
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

impl SessionStore for SqliteStore {
    fn get_page(&self, page_id: &str) -> Result<Option<PageRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        Self::read_page(&conn, page_id)
    }

    fn list_pages(&self) -> Result<Vec<PageRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let ids: Vec<String> = {
            let mut stmt =
                conn.prepare("SELECT page_id FROM pages ORDER BY last_updated DESC, page_id DESC")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut pages = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(page) = Self::read_page(&conn, &id)? {
                pages.push(page);
            }
        }
        Ok(pages)
    }

    fn put_page(&self, page: &PageRecord) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction()?;
        Self::write_page(&tx, page)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_page(&self, page_id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        conn.execute("DELETE FROM extractions WHERE page_id = ?1", params![page_id])?;
        let removed = conn.execute("DELETE FROM pages WHERE page_id = ?1", params![page_id])?;
        Ok(removed > 0)
    }

    fn overrides(&self) -> Result<OverrideTable> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        Self::read_overrides(&conn)
    }

    fn upsert_override(&self, key: &str, edit: ElementOverride) -> Result<ElementOverride> {
        let mut conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored: Option<String> = tx
            .query_row("SELECT data FROM overrides WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        let mut current: ElementOverride = match stored {
            Some(data) => serde_json::from_str(&data)?,
            None => ElementOverride::default(),
        };
        current.merge(edit);

        tx.execute(
            r#"
            INSERT INTO overrides (key, data, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
            params![key, serde_json::to_string(&current)?, format_time(&Utc::now())],
        )?;
        tx.commit()?;
        Ok(current)
    }

    fn apply_changes(&self, page_id: &str) -> Result<Option<ApplyOutcome>> {
        let mut conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut page) = Self::read_page(&tx, page_id)? else {
            return Ok(None);
        };
        let table = Self::read_overrides(&tx)?;
        let (applied, consumed) = rewrite_page(&mut page, &table);
        if applied > 0 {
            Self::write_page(&tx, &page)?;
            for (key, snapshot) in &consumed {
                tx.execute(
                    "DELETE FROM overrides WHERE key = ?1 AND data = ?2",
                    params![key, serde_json::to_string(snapshot)?],
                )?;
            }
        }
        tx.commit()?;

        tracing::info!(page_id, applied, "Applied pending overrides");
        Ok(Some(ApplyOutcome { page, applied }))
    }

    fn clear_overrides(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        conn.execute("DELETE FROM overrides", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{descriptor, exercise_concurrent_upserts, exercise_store, record};

    #[test]
    fn test_sqlite_store_behaviour() {
        exercise_store(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_store_concurrent_upserts() {
        exercise_concurrent_upserts(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_descriptors_survive_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let mut email = descriptor("#email", "Email");
        email.sample = Some("ops@example.com".into());
        email.group = Some("contact".into());
        let saved = store.save_extraction(&record("p", 7, vec![email.clone()])).unwrap();

        let loaded = store.get_page("p").unwrap().unwrap();
        assert_eq!(loaded.extractions[0].group_id, 7);
        assert_eq!(loaded.extractions[0].elements, vec![email]);
        assert_eq!(loaded.created, saved.created);
    }
}
