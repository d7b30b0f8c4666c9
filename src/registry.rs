//! Session registry: session identity, status, and host binding.
//!
//! The registry creates sessions lazily on first join, rebinds the host on
//! reconnect, and deletes sessions outright when their host connection goes
//! away. The durable store is authoritative; the local cache is a fast-path
//! hint that is refreshed on every mutating call and never consulted for
//! correctness decisions.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::metrics::GatewayMetrics;
use crate::protocol::ServerEvent;
use crate::rooms::RoomBroker;
use crate::store::{SessionRecord, SessionStatus, Store, StoreError};

/// A device type is host-eligible when it is present and its lowercase form
/// contains neither "admin" nor "viewer". Admins and viewers never own a
/// session's lifetime.
pub(crate) fn is_host_eligible(device_type: Option<&str>) -> bool {
    match device_type {
        Some(dt) if !dt.trim().is_empty() => {
            let lower = dt.to_lowercase();
            !lower.contains("admin") && !lower.contains("viewer")
        }
        _ => false,
    }
}

pub struct SessionRegistry {
    store: Arc<dyn Store>,
    broker: Arc<RoomBroker>,
    cache: DashMap<String, SessionRecord>,
    metrics: Arc<GatewayMetrics>,
    default_device_type: String,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<RoomBroker>,
        metrics: Arc<GatewayMetrics>,
        default_device_type: String,
    ) -> Self {
        Self {
            store,
            broker,
            cache: DashMap::new(),
            metrics,
            default_device_type,
        }
    }

    /// Send the current active-session snapshot to a newly connected peer.
    /// Read-only: no session state changes on connect.
    pub async fn on_connect(&self, conn_id: &str) -> Result<(), StoreError> {
        let sessions = self.store.active_sessions().await?;
        self.broker
            .direct(conn_id, ServerEvent::SessionsUpdate(sessions));
        Ok(())
    }

    /// Upsert session state for a join. Creates the session if absent;
    /// re-activates and rebinds `hostId` when a host-eligible device joins an
    /// existing session (host reconnect under a new connection identity).
    /// Concurrent host-eligible joins race; last write wins by design.
    ///
    /// Always re-broadcasts the full active list to every connection.
    pub async fn join(
        &self,
        session_id: &str,
        device_type: Option<&str>,
        conn_id: &str,
    ) -> Result<SessionRecord, StoreError> {
        // An empty deviceType is the same as none: not host-eligible and
        // replaced by the configured default in the stored document.
        let device_type = device_type.filter(|dt| !dt.trim().is_empty());
        let is_host = is_host_eligible(device_type);

        let session = match self.store.find_session(session_id).await? {
            None => {
                let record = SessionRecord::new(
                    session_id,
                    device_type.unwrap_or(&self.default_device_type),
                    is_host.then(|| conn_id.to_string()),
                );
                self.store.upsert_session(record.clone()).await?;
                info!(session = session_id, host = is_host, "session created");
                record
            }
            Some(mut record) => {
                if is_host {
                    record.status = SessionStatus::Active;
                    record.host_id = Some(conn_id.to_string());
                    self.store.upsert_session(record.clone()).await?;
                    info!(session = session_id, conn = conn_id, "host rebound");
                }
                record
            }
        };

        self.cache.insert(session_id.to_string(), session.clone());
        self.broadcast_sessions().await?;
        Ok(session)
    }

    /// Reap any session whose host was this connection. Deletion is
    /// unconditional and immediate; only the independent durable activity
    /// log survives. Re-broadcasts the active list afterwards.
    pub async fn on_disconnect(&self, conn_id: &str) -> Result<(), StoreError> {
        let removed = self.store.delete_sessions_by_host(conn_id).await?;
        self.cache
            .retain(|_, session| session.host_id.as_deref() != Some(conn_id));
        if removed > 0 {
            info!(conn = conn_id, removed, "reaped sessions for disconnected host");
        }
        self.broadcast_sessions().await?;
        Ok(())
    }

    /// Persist a new screenshot interval. The relay layer forwards the
    /// matching `config:update` to the room.
    pub async fn update_config(
        &self,
        session_id: &str,
        screenshot_interval: u32,
    ) -> Result<(), StoreError> {
        self.store
            .set_screenshot_interval(session_id, screenshot_interval)
            .await?;
        self.cache.remove(session_id);
        debug!(session = session_id, interval = screenshot_interval, "session config updated");
        Ok(())
    }

    /// Store-backed snapshot of active sessions.
    pub async fn active_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.store.active_sessions().await
    }

    async fn broadcast_sessions(&self) -> Result<(), StoreError> {
        let sessions = self.store.active_sessions().await?;
        self.metrics.active_sessions.set(sessions.len() as f64);
        self.broker
            .broadcast_all(&ServerEvent::SessionsUpdate(sessions));
        Ok(())
    }
}
