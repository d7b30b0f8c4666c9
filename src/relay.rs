//! Event dispatch: signaling relay and control/data relay.
//!
//! Every inbound frame lands here. Signaling events are pure pass-through;
//! control events follow a two-step pattern: relay the raw event to the
//! room, then record it via the activity recorder. Recording is contained —
//! a storage failure there is logged and swallowed so it can never take the
//! connection down. Direct store mutations (screenshot/contacts/media
//! pushes, config persistence) propagate their error to the connection
//! loop, which logs it and keeps the connection alive; isolation between
//! events is mandatory.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::metrics::GatewayMetrics;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::recorder::ActivityRecorder;
use crate::registry::SessionRegistry;
use crate::rooms::{ConnId, ConnectionHandle, RoomBroker};
use crate::store::{ActivityKind, ContactEntry, MediaEntry, ScreenshotEntry, Store, StoreError};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

/// The gateway core: room broker, session registry, and activity recorder
/// behind a single event-dispatch surface. The transport layer owns the
/// sockets; this type only ever sees connection ids and event values, which
/// keeps the whole relay testable without a network.
pub struct Gateway {
    config: GatewayConfig,
    broker: Arc<RoomBroker>,
    registry: SessionRegistry,
    recorder: ActivityRecorder,
    store: Arc<dyn Store>,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn Store>,
        config: GatewayConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        let broker = Arc::new(RoomBroker::new());
        let registry = SessionRegistry::new(
            store.clone(),
            broker.clone(),
            metrics.clone(),
            config.default_device_type.clone(),
        );
        let recorder =
            ActivityRecorder::new(store.clone(), broker.clone(), config.activity_window_cap);
        Self {
            config,
            broker,
            registry,
            recorder,
            store,
            metrics,
        }
    }

    /// Register a new connection and return its identity. The sender is the
    /// connection's outbound event queue; the transport drains it.
    pub fn connect(&self, sender: UnboundedSender<ServerEvent>) -> ConnId {
        let conn_id = Uuid::new_v4().to_string();
        self.broker
            .register(&conn_id, ConnectionHandle::new(sender));
        self.metrics
            .active_connections
            .set(self.broker.connection_count() as f64);
        conn_id
    }

    /// Send the active-session snapshot to a freshly connected peer.
    pub async fn handle_connect(&self, conn_id: &str) -> Result<(), RelayError> {
        self.registry.on_connect(conn_id).await?;
        Ok(())
    }

    /// Tear down a connection: reap any session it hosted (the host binding
    /// is checked before the handle is dropped), then unbind it from every
    /// room.
    pub async fn handle_disconnect(&self, conn_id: &str) -> Result<(), RelayError> {
        let result = self.registry.on_disconnect(conn_id).await;
        self.broker.disconnect(conn_id);
        self.metrics
            .active_connections
            .set(self.broker.connection_count() as f64);
        self.metrics
            .active_rooms
            .set(self.broker.room_count() as f64);
        result?;
        Ok(())
    }

    /// Dispatch a single inbound event.
    pub async fn handle_event(&self, conn_id: &str, event: ClientEvent) -> Result<(), RelayError> {
        match event {
            ClientEvent::Join {
                session_id,
                device_type,
            } => self.on_join(conn_id, &session_id, device_type.as_deref()).await?,

            // WebRTC signaling: verbatim pass-through tagged with the sender
            ClientEvent::ScreenOffer { session_id, offer } => {
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::ScreenOffer {
                        offer,
                        from: conn_id.to_string(),
                    },
                    Some(conn_id),
                );
            }
            ClientEvent::ScreenAnswer { session_id, answer } => {
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::ScreenAnswer {
                        answer,
                        from: conn_id.to_string(),
                    },
                    Some(conn_id),
                );
            }
            ClientEvent::IceCandidate {
                session_id,
                candidate,
            } => {
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::IceCandidate {
                        candidate,
                        from: conn_id.to_string(),
                    },
                    Some(conn_id),
                );
            }

            ClientEvent::SessionsGet => {
                let sessions = self.registry.active_sessions().await?;
                self.broker
                    .direct(conn_id, ServerEvent::SessionsUpdate(sessions));
            }

            ClientEvent::ControlMouse {
                session_id,
                x,
                y,
                click,
            } => {
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::ControlMouse {
                        session_id: session_id.clone(),
                        x,
                        y,
                        click,
                    },
                    Some(conn_id),
                );
                self.record(
                    &session_id,
                    ActivityKind::MouseClick,
                    Some(format!("Click injected by {conn_id}")),
                    Some(x),
                    Some(y),
                )
                .await;
            }

            ClientEvent::ControlKeyboard {
                session_id,
                key,
                kind,
            } => {
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::ControlKeyboard {
                        session_id: session_id.clone(),
                        key: key.clone(),
                        kind,
                    },
                    Some(conn_id),
                );
                self.record(
                    &session_id,
                    ActivityKind::KeyboardEvent,
                    Some(format!("Key: {key}")),
                    None,
                    None,
                )
                .await;
            }

            ClientEvent::ControlScreenshot { session_id } => {
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::ControlScreenshot {
                        session_id: session_id.clone(),
                    },
                    Some(conn_id),
                );
                self.record(
                    &session_id,
                    ActivityKind::ScreenshotRequest,
                    Some("Admin/Peer requested snapshot".to_string()),
                    None,
                    None,
                )
                .await;
            }

            ClientEvent::ScreenshotConfig {
                session_id,
                interval,
            } => {
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::ScreenshotConfig {
                        session_id: session_id.clone(),
                        interval,
                    },
                    Some(conn_id),
                );
                self.record(
                    &session_id,
                    ActivityKind::ScreenshotConfig,
                    Some(format!("Screenshot interval set to {interval}ms")),
                    None,
                    None,
                )
                .await;
            }

            ClientEvent::ScreenshotUpload {
                session_id,
                image,
                timestamp,
            } => {
                let timestamp = timestamp.unwrap_or_else(Utc::now);
                let entry = ScreenshotEntry {
                    url: image.clone(),
                    timestamp,
                };
                self.store
                    .push_screenshot(&session_id, &entry, self.config.screenshot_cap)
                    .await?;
                self.record(
                    &session_id,
                    ActivityKind::ScreenshotUpload,
                    Some("New screen frame uploaded".to_string()),
                    None,
                    None,
                )
                .await;
                // Whole room, uploader included
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::ScreenshotNew {
                        session_id: session_id.clone(),
                        image,
                        timestamp,
                    },
                    None,
                );
            }

            ClientEvent::ContactsShare {
                session_id,
                contacts,
            } => {
                let now = Utc::now();
                let stamped: Vec<ContactEntry> = contacts
                    .into_iter()
                    .map(|c| ContactEntry {
                        name: c.name,
                        phone: c.phone,
                        timestamp: now,
                    })
                    .collect();
                self.store.push_contacts(&session_id, &stamped).await?;
                self.record(
                    &session_id,
                    ActivityKind::ContactsSync,
                    Some(format!("Synced {} contacts", stamped.len())),
                    None,
                    None,
                )
                .await;
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::ContactsNew { contacts: stamped },
                    None,
                );
            }

            ClientEvent::MediaShare { session_id, media } => {
                let now = Utc::now();
                let stamped: Vec<MediaEntry> = media
                    .into_iter()
                    .map(|m| MediaEntry {
                        url: m.url,
                        kind: m.kind,
                        timestamp: now,
                    })
                    .collect();
                self.store.push_media(&session_id, &stamped).await?;
                self.record(
                    &session_id,
                    ActivityKind::MediaSync,
                    Some(format!("Synced {} media items", stamped.len())),
                    None,
                    None,
                )
                .await;
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::MediaNew { media: stamped },
                    None,
                );
            }

            ClientEvent::MediaBandwidth { session_id, hint } => {
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::MediaBandwidth {
                        session_id: session_id.clone(),
                        hint,
                    },
                    Some(conn_id),
                );
                self.record(
                    &session_id,
                    ActivityKind::MediaBandwidthHint,
                    Some(format!("Bandwidth hint: {}", hint.as_str())),
                    None,
                    None,
                )
                .await;
            }

            ClientEvent::PermissionRequest {
                session_id,
                permission,
            } => {
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::PermissionPrompt {
                        session_id: session_id.clone(),
                        permission: permission.clone(),
                    },
                    Some(conn_id),
                );
                self.record(
                    &session_id,
                    ActivityKind::PermissionRequest,
                    Some(format!("Request for {permission} from {conn_id}")),
                    None,
                    None,
                )
                .await;
            }

            ClientEvent::AccessRequest {
                target_id,
                from_id,
                device_type,
            } => {
                let device_type =
                    device_type.unwrap_or_else(|| "Remote User".to_string());
                // The target session room hears the knock
                self.broker.broadcast(
                    &target_id,
                    &ServerEvent::AccessRequest {
                        from_id: from_id.clone(),
                        device_type: device_type.clone(),
                    },
                    None,
                );
                self.record(
                    &target_id,
                    ActivityKind::AccessRequest,
                    Some(format!("Access requested by {from_id} ({device_type})")),
                    None,
                    None,
                )
                .await;
            }

            ClientEvent::AccessResponse {
                target_id,
                from_id,
                accepted,
            } => {
                // Straight back to the requester, no room broadcast
                self.broker.direct(
                    &target_id,
                    ServerEvent::AccessResponse { from_id, accepted },
                );
            }

            ClientEvent::DataSync { session_id } => {
                self.broker
                    .broadcast(&session_id, &ServerEvent::DataSync, Some(conn_id));
                self.record(
                    &session_id,
                    ActivityKind::DataSyncRequest,
                    Some(format!("Manual sync requested by {conn_id}")),
                    None,
                    None,
                )
                .await;
            }

            ClientEvent::ConfigUpdate {
                session_id,
                screenshot_interval,
            } => {
                self.registry
                    .update_config(&session_id, screenshot_interval)
                    .await?;
                self.record(
                    &session_id,
                    ActivityKind::ConfigUpdate,
                    Some(format!(
                        "Screenshot interval updated to {screenshot_interval}s"
                    )),
                    None,
                    None,
                )
                .await;
                self.broker.broadcast(
                    &session_id,
                    &ServerEvent::ConfigUpdate {
                        screenshot_interval,
                    },
                    Some(conn_id),
                );
            }
        }

        self.metrics.events_relayed.inc();
        Ok(())
    }

    async fn on_join(
        &self,
        conn_id: &str,
        session_id: &str,
        device_type: Option<&str>,
    ) -> Result<(), RelayError> {
        // Clients that lost their session id send the literal "undefined";
        // neither it nor an empty id may create a session or broadcast.
        if session_id.is_empty() || session_id == "undefined" {
            warn!(conn = conn_id, session = session_id, "join with invalid session id dropped");
            self.metrics.protocol_drops.inc();
            return Ok(());
        }

        self.broker.join(conn_id, session_id);
        self.metrics
            .active_rooms
            .set(self.broker.room_count() as f64);
        self.broker.broadcast(
            session_id,
            &ServerEvent::UserJoined {
                user_id: conn_id.to_string(),
            },
            Some(conn_id),
        );

        self.registry.join(session_id, device_type, conn_id).await?;

        // Ask peers already sharing to (re)start their stream for the joiner
        self.broker.broadcast(
            session_id,
            &ServerEvent::RequestStream {
                from: conn_id.to_string(),
            },
            Some(conn_id),
        );
        Ok(())
    }

    /// Fire-and-forget activity recording: errors are logged and contained
    /// so one failed write cannot affect the connection or sibling events.
    async fn record(
        &self,
        session_id: &str,
        action: ActivityKind,
        details: Option<String>,
        x: Option<f64>,
        y: Option<f64>,
    ) {
        match self.recorder.record(session_id, action, details, x, y).await {
            Ok(_) => self.metrics.activities_recorded.inc(),
            Err(e) => {
                self.metrics.store_errors.inc();
                warn!(
                    session = session_id,
                    action = action.as_str(),
                    error = %e,
                    "failed to record activity"
                );
            }
        }
    }
}
