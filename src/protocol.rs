//! Wire protocol for the gateway's WebSocket transport.
//!
//! Messages are JSON frames tagged as `{"event": "...", "data": {...}}`.
//! Signaling payloads (SDP offers/answers, ICE candidates) are opaque
//! `serde_json::Value`s: the gateway relays them verbatim and never inspects
//! their shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{ActivityRecord, ContactEntry, MediaEntry, SessionRecord};

/// A contact as shared by the host device. The server stamps the receive
/// time before persisting and relaying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

/// A media item as shared by the host device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Requested streaming quality for the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandwidthHint {
    Low,
    High,
}

impl BandwidthHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            BandwidthHint::Low => "low",
            BandwidthHint::High => "high",
        }
    }
}

/// Inbound events, one per transport frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join", rename_all = "camelCase")]
    Join {
        session_id: String,
        #[serde(default)]
        device_type: Option<String>,
    },
    #[serde(rename = "screen:offer", rename_all = "camelCase")]
    ScreenOffer { session_id: String, offer: Value },
    #[serde(rename = "screen:answer", rename_all = "camelCase")]
    ScreenAnswer { session_id: String, answer: Value },
    #[serde(rename = "ice:candidate", rename_all = "camelCase")]
    IceCandidate { session_id: String, candidate: Value },
    #[serde(rename = "sessions:get")]
    SessionsGet,
    #[serde(rename = "control:mouse", rename_all = "camelCase")]
    ControlMouse {
        session_id: String,
        x: f64,
        y: f64,
        #[serde(default)]
        click: Option<String>,
    },
    #[serde(rename = "control:keyboard", rename_all = "camelCase")]
    ControlKeyboard {
        session_id: String,
        key: String,
        #[serde(rename = "type")]
        kind: String,
    },
    #[serde(rename = "control:screenshot", rename_all = "camelCase")]
    ControlScreenshot { session_id: String },
    #[serde(rename = "screenshot:config", rename_all = "camelCase")]
    ScreenshotConfig { session_id: String, interval: u32 },
    #[serde(rename = "screenshot:upload", rename_all = "camelCase")]
    ScreenshotUpload {
        session_id: String,
        image: String,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "contacts:share", rename_all = "camelCase")]
    ContactsShare {
        session_id: String,
        contacts: Vec<Contact>,
    },
    #[serde(rename = "media:share", rename_all = "camelCase")]
    MediaShare {
        session_id: String,
        media: Vec<MediaItem>,
    },
    #[serde(rename = "media:bandwidth", rename_all = "camelCase")]
    MediaBandwidth {
        session_id: String,
        hint: BandwidthHint,
    },
    #[serde(rename = "permission:request", rename_all = "camelCase")]
    PermissionRequest {
        session_id: String,
        permission: String,
    },
    #[serde(rename = "access:request", rename_all = "camelCase")]
    AccessRequest {
        target_id: String,
        from_id: String,
        #[serde(default)]
        device_type: Option<String>,
    },
    #[serde(rename = "access:response", rename_all = "camelCase")]
    AccessResponse {
        target_id: String,
        from_id: String,
        accepted: bool,
    },
    #[serde(rename = "data:sync", rename_all = "camelCase")]
    DataSync { session_id: String },
    #[serde(rename = "config:update", rename_all = "camelCase")]
    ConfigUpdate {
        session_id: String,
        screenshot_interval: u32,
    },
}

/// Outbound events delivered to connections by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "sessions:update")]
    SessionsUpdate(Vec<SessionRecord>),
    #[serde(rename = "user:joined", rename_all = "camelCase")]
    UserJoined { user_id: String },
    #[serde(rename = "request:stream", rename_all = "camelCase")]
    RequestStream { from: String },
    #[serde(rename = "screen:offer", rename_all = "camelCase")]
    ScreenOffer { offer: Value, from: String },
    #[serde(rename = "screen:answer", rename_all = "camelCase")]
    ScreenAnswer { answer: Value, from: String },
    #[serde(rename = "ice:candidate", rename_all = "camelCase")]
    IceCandidate { candidate: Value, from: String },
    #[serde(rename = "activity:new")]
    ActivityNew(ActivityRecord),
    #[serde(rename = "control:mouse", rename_all = "camelCase")]
    ControlMouse {
        session_id: String,
        x: f64,
        y: f64,
        #[serde(default)]
        click: Option<String>,
    },
    #[serde(rename = "control:keyboard", rename_all = "camelCase")]
    ControlKeyboard {
        session_id: String,
        key: String,
        #[serde(rename = "type")]
        kind: String,
    },
    #[serde(rename = "control:screenshot", rename_all = "camelCase")]
    ControlScreenshot { session_id: String },
    #[serde(rename = "screenshot:config", rename_all = "camelCase")]
    ScreenshotConfig { session_id: String, interval: u32 },
    #[serde(rename = "screenshot:new", rename_all = "camelCase")]
    ScreenshotNew {
        session_id: String,
        image: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "contacts:new", rename_all = "camelCase")]
    ContactsNew { contacts: Vec<ContactEntry> },
    #[serde(rename = "media:new", rename_all = "camelCase")]
    MediaNew { media: Vec<MediaEntry> },
    #[serde(rename = "media:bandwidth", rename_all = "camelCase")]
    MediaBandwidth {
        session_id: String,
        hint: BandwidthHint,
    },
    #[serde(rename = "permission:prompt", rename_all = "camelCase")]
    PermissionPrompt {
        session_id: String,
        permission: String,
    },
    #[serde(rename = "access:request", rename_all = "camelCase")]
    AccessRequest {
        from_id: String,
        device_type: String,
    },
    #[serde(rename = "access:response", rename_all = "camelCase")]
    AccessResponse { from_id: String, accepted: bool },
    /// Relayed without a payload; the room key is implicit in delivery.
    #[serde(rename = "data:sync")]
    DataSync,
    #[serde(rename = "config:update", rename_all = "camelCase")]
    ConfigUpdate { screenshot_interval: u32 },
}
