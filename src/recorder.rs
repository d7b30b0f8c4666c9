//! Activity recorder: dual-write of session activity.
//!
//! Every recorded event goes three places, sequentially: the durable
//! activity log (authoritative for audit), the owning session's capped
//! `activityLogs` window (dashboard convenience), and an `activity:new`
//! broadcast to the room. There is no transactionality across the three
//! steps; a crash can leave the durable log ahead of the window or the
//! broadcast, which is acceptable because only the durable log is
//! authoritative.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::protocol::ServerEvent;
use crate::rooms::RoomBroker;
use crate::store::{ActivityKind, ActivityRecord, Store, StoreError};

pub struct ActivityRecorder {
    store: Arc<dyn Store>,
    broker: Arc<RoomBroker>,
    window_cap: usize,
}

impl ActivityRecorder {
    pub fn new(store: Arc<dyn Store>, broker: Arc<RoomBroker>, window_cap: usize) -> Self {
        Self {
            store,
            broker,
            window_cap,
        }
    }

    /// Record one activity. Sequential per event: durable append, capped
    /// window push, room broadcast. Callers treat this as fire-and-forget
    /// and contain the error; a failure here must never take down the
    /// connection or affect sibling events.
    pub async fn record(
        &self,
        session_id: &str,
        action: ActivityKind,
        details: Option<String>,
        x: Option<f64>,
        y: Option<f64>,
    ) -> Result<ActivityRecord, StoreError> {
        let entry = ActivityRecord {
            id: None,
            session_id: session_id.to_string(),
            action,
            details,
            x,
            y,
            timestamp: Utc::now(),
            user_id: None,
        };

        // 1. Permanent log
        let stored = self.store.append_activity(entry).await?;

        // 2. Session-scoped window for the live dashboard
        self.store
            .push_activity_window(session_id, &stored, self.window_cap)
            .await?;

        // 3. Notify room listeners (admins/controllers)
        self.broker
            .broadcast(session_id, &ServerEvent::ActivityNew(stored.clone()), None);

        debug!(
            session = session_id,
            action = action.as_str(),
            details = stored.details.as_deref().unwrap_or(""),
            "activity recorded"
        );
        Ok(stored)
    }
}
