//! Room broker: maps live connections to session rooms and fans events out.
//!
//! The broker is deliberately independent of the transport layer. A
//! connection is just an id plus an in-memory sender; the WebSocket handler
//! registers real socket-backed senders, tests register plain channels.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::protocol::ServerEvent;

/// Connection identity. Assigned by the gateway on registration (uuid v4 in
/// production) and used as the host binding in session documents.
pub type ConnId = String;

/// Handle to a live connection's outbound event queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    sender: UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(sender: UnboundedSender<ServerEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: ServerEvent) {
        // Receiver gone means the connection is tearing down; dropping the
        // event matches the fail-silent posture.
        let _ = self.sender.send(event);
    }
}

/// Explicit mapping from room key to the set of bound connection ids.
#[derive(Default)]
pub struct RoomBroker {
    connections: DashMap<ConnId, ConnectionHandle>,
    rooms: DashMap<String, HashSet<ConnId>>,
    memberships: DashMap<ConnId, HashSet<String>>,
}

impl RoomBroker {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Bind a live connection handle. Must precede any join.
    pub fn register(&self, conn_id: &str, handle: ConnectionHandle) {
        self.connections.insert(conn_id.to_string(), handle);
    }

    /// Bind a connection to a room.
    pub fn join(&self, conn_id: &str, session_id: &str) {
        self.rooms
            .entry(session_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
        self.memberships
            .entry(conn_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        debug!(conn = conn_id, room = session_id, "connection joined room");
    }

    /// Unbind a connection from one room.
    pub fn leave(&self, conn_id: &str, session_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(session_id) {
            members.remove(conn_id);
        }
        self.rooms.remove_if(session_id, |_, members| members.is_empty());
        if let Some(mut rooms) = self.memberships.get_mut(conn_id) {
            rooms.remove(session_id);
        }
    }

    /// Remove the connection from every room and drop its handle. Returns
    /// the rooms it was bound to. Callers react to the disconnect (session
    /// reaping, rebroadcast) before or after as they need; the handle stays
    /// valid until this call.
    pub fn disconnect(&self, conn_id: &str) -> Vec<String> {
        let rooms: Vec<String> = self
            .memberships
            .remove(conn_id)
            .map(|(_, rooms)| rooms.into_iter().collect())
            .unwrap_or_default();
        for room in &rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(conn_id);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
        self.connections.remove(conn_id);
        rooms
    }

    /// Deliver to every member of the room, optionally excluding one
    /// connection (the sender). An empty or unknown room is a silent no-op.
    pub fn broadcast(&self, session_id: &str, event: &ServerEvent, exclude: Option<&str>) {
        let Some(members) = self.rooms.get(session_id) else {
            return;
        };
        for member in members.iter() {
            if exclude == Some(member.as_str()) {
                continue;
            }
            if let Some(handle) = self.connections.get(member) {
                handle.send(event.clone());
            }
        }
    }

    /// Deliver to every registered connection, room membership aside.
    pub fn broadcast_all(&self, event: &ServerEvent) {
        for entry in self.connections.iter() {
            entry.value().send(event.clone());
        }
    }

    /// Deliver to exactly one connection. Unknown target is a silent no-op.
    pub fn direct(&self, conn_id: &str, event: ServerEvent) {
        if let Some(handle) = self.connections.get(conn_id) {
            handle.send(event);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_members(&self, session_id: &str) -> Vec<ConnId> {
        self.rooms
            .get(session_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }
}
