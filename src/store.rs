//! Storage abstraction for sessions and activity records.
//!
//! This module defines the `Store` trait and provides an in-memory
//! implementation for testing and MVP use cases. The store is the only
//! authoritative owner of session and activity data; everything the gateway
//! keeps in memory is a hint.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ============================================================================
// Data Models
// ============================================================================

/// Lifecycle state of a session document.
///
/// Only `Active` is ever set or cleared by the gateway; `Ended` and `Paused`
/// are declared states with no reachable transition (host disconnect deletes
/// the document outright instead of soft-ending it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
    Paused,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
            SessionStatus::Paused => "paused",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            "paused" => Ok(SessionStatus::Paused),
            other => Err(StoreError::Serialization(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}

/// Action tag attached to every activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    MouseClick,
    KeyboardEvent,
    ScreenshotRequest,
    ScreenshotConfig,
    ScreenshotUpload,
    ContactsSync,
    MediaSync,
    MediaBandwidthHint,
    PermissionRequest,
    AccessRequest,
    DataSyncRequest,
    ConfigUpdate,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::MouseClick => "mouse_click",
            ActivityKind::KeyboardEvent => "keyboard_event",
            ActivityKind::ScreenshotRequest => "screenshot_request",
            ActivityKind::ScreenshotConfig => "screenshot_config",
            ActivityKind::ScreenshotUpload => "screenshot_upload",
            ActivityKind::ContactsSync => "contacts_sync",
            ActivityKind::MediaSync => "media_sync",
            ActivityKind::MediaBandwidthHint => "media_bandwidth_hint",
            ActivityKind::PermissionRequest => "permission_request",
            ActivityKind::AccessRequest => "access_request",
            ActivityKind::DataSyncRequest => "data_sync_request",
            ActivityKind::ConfigUpdate => "config_update",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mouse_click" => Ok(ActivityKind::MouseClick),
            "keyboard_event" => Ok(ActivityKind::KeyboardEvent),
            "screenshot_request" => Ok(ActivityKind::ScreenshotRequest),
            "screenshot_config" => Ok(ActivityKind::ScreenshotConfig),
            "screenshot_upload" => Ok(ActivityKind::ScreenshotUpload),
            "contacts_sync" => Ok(ActivityKind::ContactsSync),
            "media_sync" => Ok(ActivityKind::MediaSync),
            "media_bandwidth_hint" => Ok(ActivityKind::MediaBandwidthHint),
            "permission_request" => Ok(ActivityKind::PermissionRequest),
            "access_request" => Ok(ActivityKind::AccessRequest),
            "data_sync_request" => Ok(ActivityKind::DataSyncRequest),
            "config_update" => Ok(ActivityKind::ConfigUpdate),
            other => Err(StoreError::Serialization(format!(
                "unknown activity kind: {other}"
            ))),
        }
    }
}

/// Immutable activity record. Written once to the durable log and mirrored
/// into the owning session's capped window; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Auto-assigned by the store on append; `None` until written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub session_id: String,
    pub action: ActivityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// One captured screen frame in the session's bounded screenshot window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotEntry {
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// One synced contact, stamped with the server time it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEntry {
    pub name: String,
    pub phone: String,
    pub timestamp: DateTime<Utc>,
}

/// One synced media item, stamped with the server time it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

/// The session document. `session_id` is globally unique and doubles as the
/// room key. Embedded collections are mutated only through the atomic push
/// operations on the store, never through `upsert_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub host_id: Option<String>,
    pub admin_id: Option<String>,
    pub status: SessionStatus,
    pub device_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub allowed_actions: Vec<String>,
    pub timeout_minutes: u32,
    pub screenshot_interval: u32,
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub activity_logs: Vec<ActivityRecord>,
    #[serde(default)]
    pub screenshots: Vec<ScreenshotEntry>,
    #[serde(default)]
    pub contacts: Vec<ContactEntry>,
    #[serde(default)]
    pub media: Vec<MediaEntry>,
}

impl SessionRecord {
    /// New active session with schema defaults.
    pub fn new(session_id: &str, device_type: &str, host_id: Option<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            host_id,
            admin_id: None,
            status: SessionStatus::Active,
            device_type: device_type.to_string(),
            start_time: Utc::now(),
            end_time: None,
            allowed_actions: vec![
                "screen_view".to_string(),
                "mouse_control".to_string(),
                "keyboard_control".to_string(),
            ],
            timeout_minutes: 30,
            screenshot_interval: 60,
            last_activity: None,
            activity_logs: Vec::new(),
            screenshots: Vec::new(),
            contacts: Vec::new(),
            media: Vec::new(),
        }
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Durable store contract consumed by the gateway: find-by-unique-key,
/// filtered find sorted descending by timestamp, upsert-with-set, atomic
/// capped-array-push, and delete-by-filter.
///
/// All capped pushes must be atomic at the store level (a single locked
/// mutation or one transaction), never read-modify-write, so that concurrent
/// appenders from different connections cannot lose updates.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up a session by its unique id.
    async fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert or replace the scalar fields of a session document. Embedded
    /// collections already present in the store are carried by the record
    /// the caller read; pushes remain the only way to grow them.
    async fn upsert_session(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// All sessions with status `active`.
    async fn active_sessions(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Delete every session bound to the given host connection. Returns the
    /// number of sessions removed. Durable activity records are untouched.
    async fn delete_sessions_by_host(&self, host_id: &str) -> Result<usize, StoreError>;

    /// Persist a new screenshot interval for the session. Missing session is
    /// a no-op, matching document-update semantics.
    async fn set_screenshot_interval(
        &self,
        session_id: &str,
        interval_secs: u32,
    ) -> Result<(), StoreError>;

    /// Atomically append to the session's bounded activity window, dropping
    /// the oldest entries beyond `cap`, and stamp `last_activity`.
    async fn push_activity_window(
        &self,
        session_id: &str,
        entry: &ActivityRecord,
        cap: usize,
    ) -> Result<(), StoreError>;

    /// Atomically append to the session's bounded screenshot window.
    async fn push_screenshot(
        &self,
        session_id: &str,
        entry: &ScreenshotEntry,
        cap: usize,
    ) -> Result<(), StoreError>;

    /// Append to the session's contacts collection (append-only).
    async fn push_contacts(
        &self,
        session_id: &str,
        entries: &[ContactEntry],
    ) -> Result<(), StoreError>;

    /// Append to the session's media collection (append-only).
    async fn push_media(&self, session_id: &str, entries: &[MediaEntry])
        -> Result<(), StoreError>;

    /// Append an immutable record to the durable activity log and return it
    /// with its assigned id.
    async fn append_activity(&self, record: ActivityRecord) -> Result<ActivityRecord, StoreError>;

    /// Durable activity records for a session, newest first. Independent of
    /// session lifetime: survives session deletion.
    async fn activities_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ActivityRecord>, StoreError>;
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// In-memory store for tests and single-process MVP deployments.
///
/// Capped pushes happen under a single write lock, which satisfies the
/// atomic append-with-cap requirement.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    activities: RwLock<Vec<ActivityRecord>>,
    next_activity_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            activities: RwLock::new(Vec::new()),
            next_activity_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn upsert_session(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut active: Vec<SessionRecord> = sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(active)
    }

    async fn delete_sessions_by_host(&self, host_id: &str) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.host_id.as_deref() != Some(host_id));
        Ok(before - sessions.len())
    }

    async fn set_screenshot_interval(
        &self,
        session_id: &str,
        interval_secs: u32,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.screenshot_interval = interval_secs;
        }
        Ok(())
    }

    async fn push_activity_window(
        &self,
        session_id: &str,
        entry: &ActivityRecord,
        cap: usize,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.activity_logs.push(entry.clone());
            if session.activity_logs.len() > cap {
                let excess = session.activity_logs.len() - cap;
                session.activity_logs.drain(..excess);
            }
            session.last_activity = Some(Utc::now());
        }
        Ok(())
    }

    async fn push_screenshot(
        &self,
        session_id: &str,
        entry: &ScreenshotEntry,
        cap: usize,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.screenshots.push(entry.clone());
            if session.screenshots.len() > cap {
                let excess = session.screenshots.len() - cap;
                session.screenshots.drain(..excess);
            }
        }
        Ok(())
    }

    async fn push_contacts(
        &self,
        session_id: &str,
        entries: &[ContactEntry],
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.contacts.extend_from_slice(entries);
        }
        Ok(())
    }

    async fn push_media(
        &self,
        session_id: &str,
        entries: &[MediaEntry],
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.media.extend_from_slice(entries);
        }
        Ok(())
    }

    async fn append_activity(&self, record: ActivityRecord) -> Result<ActivityRecord, StoreError> {
        let mut activities = self.activities.write().await;
        let mut stored = record;
        stored.id = Some(self.next_activity_id.fetch_add(1, Ordering::SeqCst));
        activities.push(stored.clone());
        Ok(stored)
    }

    async fn activities_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let activities = self.activities.read().await;
        let mut matching: Vec<ActivityRecord> = activities
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(matching)
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
            x: None,
            y: None,
            timestamp: Utc::now(),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn memory_session_upsert_and_find() {
        let store = MemoryStore::new();
        let record = SessionRecord::new("s1", "Android Mobile", Some("c1".to_string()));

        store.upsert_session(record.clone()).await.unwrap();
        let found = store.find_session("s1").await.unwrap().unwrap();

        assert_eq!(found.session_id, "s1");
        assert_eq!(found.host_id.as_deref(), Some("c1"));
        assert_eq!(found.status, SessionStatus::Active);
        assert_eq!(found.timeout_minutes, 30);
        assert_eq!(found.screenshot_interval, 60);
        assert!(found
            .allowed_actions
            .iter()
            .any(|a| a == "mouse_control"));
    }

    #[tokio::test]
    async fn memory_find_nonexistent() {
        let store = MemoryStore::new();
        assert!(store.find_session("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_active_filter() {
        let store = MemoryStore::new();
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
    async fn memory_delete_by_host_keeps_activities() {
        let store = MemoryStore::new();
        store
            .upsert_session(SessionRecord::new("s1", "mobile", Some("c1".to_string())))
            .await
            .unwrap();
        store
            .append_activity(make_activity("s1", "before delete"))
            .await
            .unwrap();

        let removed = store.delete_sessions_by_host("c1").await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_session("s1").await.unwrap().is_none());

        let logs = store.activities_for_session("s1").await.unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn memory_delete_by_host_ignores_non_hosts() {
        let store = MemoryStore::new();
        store
            .upsert_session(SessionRecord::new("s1", "mobile", Some("c1".to_string())))
            .await
            .unwrap();

        assert_eq!(store.delete_sessions_by_host("c2").await.unwrap(), 0);
        assert!(store.find_session("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_activity_window_caps() {
        let store = MemoryStore::new();
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

        let all = store.activities_for_session("s1").await.unwrap();
        assert_eq!(all.len(), 7);
    }

    #[tokio::test]
    async fn memory_push_to_missing_session_is_noop() {
        let store = MemoryStore::new();
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
    async fn memory_screenshot_window_caps() {
        let store = MemoryStore::new();
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
    }

    #[tokio::test]
    async fn memory_contacts_append_only() {
        let store = MemoryStore::new();
        store
            .upsert_session(SessionRecord::new("s1", "mobile", None))
            .await
            .unwrap();

        let batch: Vec<ContactEntry> = (0..3)
            .map(|i| ContactEntry {
                name: format!("n{i}"),
                phone: format!("p{i}"),
                timestamp: Utc::now(),
            })
            .collect();
        store.push_contacts("s1", &batch).await.unwrap();
        store.push_contacts("s1", &batch).await.unwrap();

        let session = store.find_session("s1").await.unwrap().unwrap();
        assert_eq!(session.contacts.len(), 6);
    }

    #[tokio::test]
    async fn memory_activities_newest_first() {
        let store = MemoryStore::new();
        for i in 0..3 {
            let mut record = make_activity("s1", &format!("e{i}"));
            record.timestamp = Utc::now() + chrono::Duration::seconds(i);
            store.append_activity(record).await.unwrap();
        }

        let logs = store.activities_for_session("s1").await.unwrap();
        assert_eq!(logs[0].details.as_deref(), Some("e2"));
        assert_eq!(logs[2].details.as_deref(), Some("e0"));
    }

    #[test]
    fn activity_kind_roundtrip() {
        let kinds = [
            ActivityKind::MouseClick,
            ActivityKind::KeyboardEvent,
            ActivityKind::ScreenshotRequest,
            ActivityKind::ScreenshotConfig,
            ActivityKind::ScreenshotUpload,
            ActivityKind::ContactsSync,
            ActivityKind::MediaSync,
            ActivityKind::MediaBandwidthHint,
            ActivityKind::PermissionRequest,
            ActivityKind::AccessRequest,
            ActivityKind::DataSyncRequest,
            ActivityKind::ConfigUpdate,
        ];
        for kind in kinds {
            assert_eq!(kind.as_str().parse::<ActivityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn session_status_roundtrip() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Ended,
            SessionStatus::Paused,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
    }
}
