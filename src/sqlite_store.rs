//! SQLite-based persistent storage implementation.
//!
//! Production backend for the `Store` trait: sessions live in a parent row
//! plus child tables for the embedded collections, and the durable activity
//! log is an independent append-only table that outlives session deletion.
//! Capped pushes run inside a single transaction, which is the store-level
//! atomic append-with-cap the concurrency model requires.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::store::{
    ActivityKind, ActivityRecord, ContactEntry, MediaEntry, ScreenshotEntry, SessionRecord,
    SessionStatus, Store, StoreError,
};

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// SQLite-backed store. Thread-safe via a connection mutex; WAL mode for
/// concurrent readers.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and run migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::OperationFailed(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::OperationFailed(format!("failed to set pragmas: {e}")))?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for testing.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::OperationFailed(format!("failed to open in-memory database: {e}"))
        })?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to create schema_version: {e}")))?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < SCHEMA_VERSION {
            Self::migrate_v1(conn)?;
        }

        Ok(())
    }

    /// Migration to schema version 1 - initial schema.
    fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            -- Session documents (scalar fields)
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                host_id TEXT,
                admin_id TEXT,
                status TEXT NOT NULL,
                device_type TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                allowed_actions TEXT NOT NULL,
                timeout_minutes INTEGER NOT NULL,
                screenshot_interval INTEGER NOT NULL,
                last_activity TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_host ON sessions(host_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

            -- Embedded capped activity window (entries as JSON)
            CREATE TABLE IF NOT EXISTS session_activity_window (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                entry TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_window_session ON session_activity_window(session_id);

            -- Embedded capped screenshot window
            CREATE TABLE IF NOT EXISTS session_screenshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                url TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_screenshots_session ON session_screenshots(session_id);

            -- Embedded append-only collections
            CREATE TABLE IF NOT EXISTS session_contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_contacts_session ON session_contacts(session_id);

            CREATE TABLE IF NOT EXISTS session_media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                url TEXT NOT NULL,
                kind TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_media_session ON session_media(session_id);

            -- Durable activity log, independent of session lifetime
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT,
                x REAL,
                y REAL,
                timestamp TEXT NOT NULL,
                user_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_activities_session ON activities(session_id);
            CREATE INDEX IF NOT EXISTS idx_activities_timestamp ON activities(timestamp);

            -- Record schema version
            INSERT INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(|e| StoreError::OperationFailed(format!("migration v1 failed: {e}")))?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Helper methods for (de)serialization
    // -------------------------------------------------------------------------

    fn format_ts(ts: &DateTime<Utc>) -> String {
        // Fixed-width so lexicographic ORDER BY matches chronological order
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    }

    fn row_to_activity(row: &rusqlite::Row) -> rusqlite::Result<ActivityRecord> {
        let action: String = row.get(2)?;
        let timestamp: String = row.get(6)?;
        Ok(ActivityRecord {
            id: Some(row.get(0)?),
            session_id: row.get(1)?,
            action: ActivityKind::from_str(&action).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            details: row.get(3)?,
            x: row.get(4)?,
            y: row.get(5)?,
            timestamp: Self::parse_ts(6, timestamp)?,
            user_id: row.get(7)?,
        })
    }

    /// Assemble a full session document: scalar row plus child collections.
    fn load_session(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let base = conn
            .query_row(
                "SELECT session_id, host_id, admin_id, status, device_type, start_time,
                        end_time, allowed_actions, timeout_minutes, screenshot_interval,
                        last_activity
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                Self::row_to_session_scalars,
            )
            .optional()
            .map_err(|e| StoreError::OperationFailed(format!("failed to load session: {e}")))?;

        let Some(mut session) = base else {
            return Ok(None);
        };

        session.activity_logs = {
            let mut stmt = conn
                .prepare(
                    "SELECT entry FROM session_activity_window
                     WHERE session_id = ?1 ORDER BY id ASC",
                )
                .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {e}")))?;
            let entries = stmt
                .query_map(params![session_id], |row| row.get::<_, String>(0))
                .map_err(|e| StoreError::OperationFailed(format!("failed to read window: {e}")))?
                .collect::<Result<Vec<String>, _>>()
                .map_err(|e| StoreError::OperationFailed(format!("failed to read window: {e}")))?;
            entries
                .iter()
                .map(|json| serde_json::from_str(json))
                .collect::<Result<Vec<ActivityRecord>, _>>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?
        };

        session.screenshots = {
            let mut stmt = conn
                .prepare(
                    "SELECT url, timestamp FROM session_screenshots
                     WHERE session_id = ?1 ORDER BY id ASC",
                )
                .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {e}")))?;
            let entries = stmt
                .query_map(params![session_id], |row| {
                    let timestamp: String = row.get(1)?;
                    Ok(ScreenshotEntry {
                        url: row.get(0)?,
                        timestamp: Self::parse_ts(1, timestamp)?,
                    })
                })
                .map_err(|e| StoreError::OperationFailed(format!("failed to read screenshots: {e}")))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::OperationFailed(format!("failed to read screenshots: {e}")))?;
            entries
        };

        session.contacts = {
            let mut stmt = conn
                .prepare(
                    "SELECT name, phone, timestamp FROM session_contacts
                     WHERE session_id = ?1 ORDER BY id ASC",
                )
                .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {e}")))?;
            let entries = stmt
                .query_map(params![session_id], |row| {
                    let timestamp: String = row.get(2)?;
                    Ok(ContactEntry {
                        name: row.get(0)?,
                        phone: row.get(1)?,
                        timestamp: Self::parse_ts(2, timestamp)?,
                    })
                })
                .map_err(|e| StoreError::OperationFailed(format!("failed to read contacts: {e}")))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::OperationFailed(format!("failed to read contacts: {e}")))?;
            entries
        };

        session.media = {
            let mut stmt = conn
                .prepare(
                    "SELECT url, kind, timestamp FROM session_media
                     WHERE session_id = ?1 ORDER BY id ASC",
                )
                .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {e}")))?;
            let entries = stmt
                .query_map(params![session_id], |row| {
                    let timestamp: String = row.get(2)?;
                    Ok(MediaEntry {
                        url: row.get(0)?,
                        kind: row.get(1)?,
                        timestamp: Self::parse_ts(2, timestamp)?,
                    })
                })
                .map_err(|e| StoreError::OperationFailed(format!("failed to read media: {e}")))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::OperationFailed(format!("failed to read media: {e}")))?;
            entries
        };

        Ok(Some(session))
    }

    fn row_to_session_scalars(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
        let status: String = row.get(3)?;
        let start_time: String = row.get(5)?;
        let end_time: Option<String> = row.get(6)?;
        let allowed_actions: String = row.get(7)?;
        let last_activity: Option<String> = row.get(10)?;

        Ok(SessionRecord {
            session_id: row.get(0)?,
            host_id: row.get(1)?,
            admin_id: row.get(2)?,
            status: SessionStatus::from_str(&status).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            device_type: row.get(4)?,
            start_time: Self::parse_ts(5, start_time)?,
            end_time: end_time.map(|s| Self::parse_ts(6, s)).transpose()?,
            allowed_actions: serde_json::from_str(&allowed_actions).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            timeout_minutes: row.get(8)?,
            screenshot_interval: row.get(9)?,
            last_activity: last_activity.map(|s| Self::parse_ts(10, s)).transpose()?,
            activity_logs: Vec::new(),
            screenshots: Vec::new(),
            contacts: Vec::new(),
            media: Vec::new(),
        })
    }

    fn session_exists(conn: &Connection, session_id: &str) -> Result<bool, StoreError> {
        let found: Option<i32> = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::OperationFailed(format!("failed to check session: {e}")))?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.conn.lock().await;
        Self::load_session(&conn, session_id)
    }

    async fn upsert_session(&self, record: SessionRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let allowed_actions = serde_json::to_string(&record.allowed_actions)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO sessions (
                session_id, host_id, admin_id, status, device_type, start_time,
                end_time, allowed_actions, timeout_minutes, screenshot_interval,
                last_activity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.session_id,
                record.host_id,
                record.admin_id,
                record.status.as_str(),
                record.device_type,
                Self::format_ts(&record.start_time),
                record.end_time.as_ref().map(Self::format_ts),
                allowed_actions,
                record.timeout_minutes,
                record.screenshot_interval,
                record.last_activity.as_ref().map(Self::format_ts),
            ],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to upsert session: {e}")))?;
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let ids: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT session_id FROM sessions WHERE status = 'active' ORDER BY session_id")
                .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {e}")))?;
            let rows = stmt
                .query_map([], |row| row.get(0))
                .map_err(|e| StoreError::OperationFailed(format!("failed to list sessions: {e}")))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::OperationFailed(format!("failed to list sessions: {e}")))?;
            rows
        };

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = Self::load_session(&conn, &id)? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    async fn delete_sessions_by_host(&self, host_id: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::OperationFailed(format!("failed to start transaction: {e}")))?;

        let ids: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT session_id FROM sessions WHERE host_id = ?1")
                .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {e}")))?;
            let rows = stmt
                .query_map(params![host_id], |row| row.get(0))
                .map_err(|e| StoreError::OperationFailed(format!("failed to find sessions: {e}")))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::OperationFailed(format!("failed to find sessions: {e}")))?;
            rows
        };

        for id in &ids {
            // Embedded collections die with the session; the durable
            // activities table is left alone.
            for table in [
                "session_activity_window",
                "session_screenshots",
                "session_contacts",
                "session_media",
            ] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE session_id = ?1"),
                    params![id],
                )
                .map_err(|e|StoreError::OperationFailed(format!("failed to delete {table}: {e}")))?;
            }
            tx.execute("DELETE FROM sessions WHERE session_id = ?1", params![id])
                .map_err(|e| StoreError::OperationFailed(format!("failed to delete session: {e}")))?;
        }

        tx.commit()
            .map_err(|e| StoreError::OperationFailed(format!("failed to commit delete: {e}")))?;
        Ok(ids.len())
    }

    async fn set_screenshot_interval(
        &self,
        session_id: &str,
        interval_secs: u32,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET screenshot_interval = ?1 WHERE session_id = ?2",
            params![interval_secs, session_id],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to update interval: {e}")))?;
        Ok(())
    }

    async fn push_activity_window(
        &self,
        session_id: &str,
        entry: &ActivityRecord,
        cap: usize,
    ) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::OperationFailed(format!("failed to start transaction: {e}")))?;

        // Document-update semantics: pushing to a missing session is a no-op
        if !Self::session_exists(&tx, session_id)? {
            return Ok(());
        }

        tx.execute(
            "INSERT INTO session_activity_window (session_id, entry) VALUES (?1, ?2)",
            params![session_id, json],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to push window entry: {e}")))?;

        tx.execute(
            "DELETE FROM session_activity_window
             WHERE session_id = ?1 AND id NOT IN (
                SELECT id FROM session_activity_window
                WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
             )",
            params![session_id, cap as i64],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to trim window: {e}")))?;

        tx.execute(
            "UPDATE sessions SET last_activity = ?1 WHERE session_id = ?2",
            params![Self::format_ts(&Utc::now()), session_id],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to stamp last_activity: {e}")))?;

        tx.commit()
            .map_err(|e| StoreError::OperationFailed(format!("failed to commit push: {e}")))?;
        Ok(())
    }

    async fn push_screenshot(
        &self,
        session_id: &str,
        entry: &ScreenshotEntry,
        cap: usize,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::OperationFailed(format!("failed to start transaction: {e}")))?;

        if !Self::session_exists(&tx, session_id)? {
            return Ok(());
        }

        tx.execute(
            "INSERT INTO session_screenshots (session_id, url, timestamp) VALUES (?1, ?2, ?3)",
            params![session_id, entry.url, Self::format_ts(&entry.timestamp)],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to push screenshot: {e}")))?;

        tx.execute(
            "DELETE FROM session_screenshots
             WHERE session_id = ?1 AND id NOT IN (
                SELECT id FROM session_screenshots
                WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
             )",
            params![session_id, cap as i64],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to trim screenshots: {e}")))?;

        tx.commit()
            .map_err(|e| StoreError::OperationFailed(format!("failed to commit push: {e}")))?;
        Ok(())
    }

    async fn push_contacts(
        &self,
        session_id: &str,
        entries: &[ContactEntry],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::OperationFailed(format!("failed to start transaction: {e}")))?;

        if !Self::session_exists(&tx, session_id)? {
            return Ok(());
        }

        for entry in entries {
            tx.execute(
                "INSERT INTO session_contacts (session_id, name, phone, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id,
                    entry.name,
                    entry.phone,
                    Self::format_ts(&entry.timestamp)
                ],
            )
            .map_err(|e| StoreError::OperationFailed(format!("failed to push contact: {e}")))?;
        }

        tx.commit()
            .map_err(|e| StoreError::OperationFailed(format!("failed to commit push: {e}")))?;
        Ok(())
    }

    async fn push_media(
        &self,
        session_id: &str,
        entries: &[MediaEntry],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::OperationFailed(format!("failed to start transaction: {e}")))?;

        if !Self::session_exists(&tx, session_id)? {
            return Ok(());
        }

        for entry in entries {
            tx.execute(
                "INSERT INTO session_media (session_id, url, kind, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id,
                    entry.url,
                    entry.kind,
                    Self::format_ts(&entry.timestamp)
                ],
            )
            .map_err(|e| StoreError::OperationFailed(format!("failed to push media: {e}")))?;
        }

        tx.commit()
            .map_err(|e| StoreError::OperationFailed(format!("failed to commit push: {e}")))?;
        Ok(())
    }

    async fn append_activity(&self, record: ActivityRecord) -> Result<ActivityRecord, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO activities (session_id, action, details, x, y, timestamp, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.session_id,
                record.action.as_str(),
                record.details,
                record.x,
                record.y,
                Self::format_ts(&record.timestamp),
                record.user_id,
            ],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to append activity: {e}")))?;

        let mut stored = record;
        stored.id = Some(conn.last_insert_rowid());
        Ok(stored)
    }

    async fn activities_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, action, details, x, y, timestamp, user_id
                 FROM activities WHERE session_id = ?1
                 ORDER BY timestamp DESC, id DESC",
            )
            .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {e}")))?;

        let activities = stmt
            .query_map(params![session_id], Self::row_to_activity)
            .map_err(|e| StoreError::OperationFailed(format!("failed to list activities: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::OperationFailed(format!("failed to collect activities: {e}")))?;

        Ok(activities)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_activity(session_id: &str, details: &str) -> ActivityRecord {
        ActivityRecord {
            id: None,
            session_id: session_id.to_string(),
            action: ActivityKind::MouseClick,
            details: Some(details.to_string()),
            x: Some(1.0),
            y: Some(2.0),
            timestamp: Utc::now(),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn sqlite_session_save_and_load() {
        let store = SqliteStore::new_in_memory().unwrap();
        let record = SessionRecord::new("s1", "Android Mobile", Some("c1".to_string()));

        store.upsert_session(record.clone()).await.unwrap();
        let loaded = store.find_session("s1").await.unwrap().unwrap();

        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.host_id.as_deref(), Some("c1"));
        assert_eq!(loaded.status, SessionStatus::Active);
        assert_eq!(loaded.device_type, "Android Mobile");
        assert_eq!(loaded.allowed_actions, record.allowed_actions);
        assert_eq!(loaded.timeout_minutes, 30);
        assert_eq!(loaded.screenshot_interval, 60);
        assert!(loaded.activity_logs.is_empty());
    }

    #[tokio::test]
    async fn sqlite_load_nonexistent() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.find_session("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_upsert_rebinds_host_without_touching_window() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert_session(SessionRecord::new("s1", "mobile", Some("c1".to_string())))
            .await
            .unwrap();

        let entry = store.append_activity(make_activity("s1", "e0")).await.unwrap();
        store.push_activity_window("s1", &entry, 500).await.unwrap();

        let mut rebound = store.find_session("s1").await.unwrap().unwrap();
        rebound.host_id = Some("c2".to_string());
        store.upsert_session(rebound).await.unwrap();

        let loaded = store.find_session("s1").await.unwrap().unwrap();
        assert_eq!(loaded.host_id.as_deref(), Some("c2"));
        assert_eq!(loaded.activity_logs.len(), 1);
    }

    #[tokio::test]
    async fn sqlite_active_filter() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut ended = SessionRecord::new("s1", "mobile", None);
        ended.status = SessionStatus::Ended;
        store.upsert_session(ended).await.unwrap();
        store
            .upsert_session(SessionRecord::new("s2", "mobile", None))
            .await
            .unwrap();

        let active = store.active_sessions().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, "s2");
    }

    #[tokio::test]
    async fn sqlite_activity_window_caps_and_stamps() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert_session(SessionRecord::new("s1", "mobile", None))
            .await
            .unwrap();

        for i in 0..7 {
            let entry = store
                .append_activity(make_activity("s1", &format!("e{i}")))
                .await
                .unwrap();
            store.push_activity_window("s1", &entry, 5).await.unwrap();
        }

        let session = store.find_session("s1").await.unwrap().unwrap();
        assert_eq!(session.activity_logs.len(), 5);
        assert_eq!(session.activity_logs[0].details.as_deref(), Some("e2"));
        assert_eq!(session.activity_logs[4].details.as_deref(), Some("e6"));
        assert!(session.last_activity.is_some());

        assert_eq!(store.activities_for_session("s1").await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn sqlite_push_to_missing_session_is_noop() {
        let store = SqliteStore::new_in_memory().unwrap();
        let entry = store
            .append_activity(make_activity("ghost", "x"))
            .await
            .unwrap();
        store
            .push_activity_window("ghost", &entry, 500)
            .await
            .unwrap();
        assert!(store.find_session("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_screenshot_window_caps() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert_session(SessionRecord::new("s1", "mobile", None))
            .await
            .unwrap();

        for i in 0..4 {
            let entry = ScreenshotEntry {
                url: format!("frame-{i}"),
                timestamp: Utc::now(),
            };
            store.push_screenshot("s1", &entry, 3).await.unwrap();
        }

        let session = store.find_session("s1").await.unwrap().unwrap();
        assert_eq!(session.screenshots.len(), 3);
        assert_eq!(session.screenshots[0].url, "frame-1");
        assert_eq!(session.screenshots[2].url, "frame-3");
    }

    #[tokio::test]
    async fn sqlite_contacts_and_media_append() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert_session(SessionRecord::new("s1", "mobile", None))
            .await
            .unwrap();

        let contacts = vec![ContactEntry {
            name: "alice".to_string(),
            phone: "123".to_string(),
            timestamp: Utc::now(),
        }];
        store.push_contacts("s1", &contacts).await.unwrap();
        store.push_contacts("s1", &contacts).await.unwrap();

        let media = vec![MediaEntry {
            url: "file.mp4".to_string(),
            kind: "video".to_string(),
            timestamp: Utc::now(),
        }];
        store.push_media("s1", &media).await.unwrap();

        let session = store.find_session("s1").await.unwrap().unwrap();
        assert_eq!(session.contacts.len(), 2);
        assert_eq!(session.contacts[0].name, "alice");
        assert_eq!(session.media.len(), 1);
        assert_eq!(session.media[0].kind, "video");
    }

    #[tokio::test]
    async fn sqlite_delete_by_host_keeps_activities() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert_session(SessionRecord::new("s1", "mobile", Some("c1".to_string())))
            .await
            .unwrap();
        store
            .append_activity(make_activity("s1", "survives"))
            .await
            .unwrap();

        let removed = store.delete_sessions_by_host("c1").await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_session("s1").await.unwrap().is_none());

        let logs = store.activities_for_session("s1").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].details.as_deref(), Some("survives"));
    }

    #[tokio::test]
    async fn sqlite_activities_newest_first() {
        let store = SqliteStore::new_in_memory().unwrap();
        for i in 0..3 {
            let mut record = make_activity("s1", &format!("e{i}"));
            record.timestamp = Utc::now() + chrono::Duration::seconds(i);
            store.append_activity(record).await.unwrap();
        }

        let logs = store.activities_for_session("s1").await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].details.as_deref(), Some("e2"));
        assert_eq!(logs[2].details.as_deref(), Some("e0"));
    }

    #[tokio::test]
    async fn sqlite_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store
                .upsert_session(SessionRecord::new("s1", "mobile", None))
                .await
                .unwrap();
        }

        let reopened = SqliteStore::new(&path).unwrap();
        assert!(reopened.find_session("s1").await.unwrap().is_some());
    }
}
