use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::metrics;

pub mod message_types;
pub mod router;
pub mod session;

pub use message_types::{encode_frame, events, MessageEnvelope, WsInboundEvent};
pub use router::{EventRouter, SendOutcome};

/// Unique identifier of one live transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant-scoped user identity; the same user id in two tenants is two users
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserKey {
    pub tenant_id: String,
    pub user_id: String,
}

impl UserKey {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RoomKey {
    tenant_id: String,
    room: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("user {user} already has {limit} live connections")]
    ConnectionLimit { user: String, limit: usize },

    #[error("outbound queue full for connection {0}")]
    QueueFull(ConnectionId),

    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error("frame serialization failed: {0}")]
    Serialization(String),
}

/// Registry-side handle of one connection: identity plus the sending half
/// of its bounded outbound queue. Equality is by connection id.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user: UserKey,
    sender: mpsc::Sender<String>,
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl ConnectionHandle {
    /// New handle plus the receiver the transport drains into the socket
    pub fn new(user: UserKey, queue_capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            user,
            sender,
        };
        (handle, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user(&self) -> &UserKey {
        &self.user
    }

    /// Queue an encoded frame without waiting
    pub fn send_frame(&self, frame: String) -> Result<(), RegistryError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RegistryError::QueueFull(self.id),
            mpsc::error::TrySendError::Closed(_) => RegistryError::Closed(self.id),
        })
    }

    pub fn send_event<T: Serialize + ?Sized>(
        &self,
        event: &str,
        data: &T,
    ) -> Result<(), RegistryError> {
        let frame =
            encode_frame(event, data).map_err(|e| RegistryError::Serialization(e.to_string()))?;
        self.send_frame(frame)
    }
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<UserKey, Vec<ConnectionHandle>>,
    rooms: HashMap<RoomKey, Vec<ConnectionHandle>>,
}

impl RegistryState {
    fn total(&self) -> usize {
        self.connections.values().map(Vec::len).sum()
    }
}

/// Process-wide map of live connections per user, plus room membership.
///
/// All mutation goes through one `RwLock`; broadcasts take the read side and
/// never await while holding it.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryState>>,
    max_per_user: usize,
}

impl ConnectionRegistry {
    pub fn new(max_per_user: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryState::default())),
            max_per_user: max_per_user.max(1),
        }
    }

    /// Add a connection for its user.
    ///
    /// Returns `false` if the exact connection was already registered.
    pub async fn register(&self, handle: ConnectionHandle) -> Result<bool, RegistryError> {
        let mut guard = self.inner.write().await;
        let entries = guard.connections.entry(handle.user.clone()).or_default();

        if entries.iter().any(|h| h.id == handle.id) {
            return Ok(false);
        }
        if entries.len() >= self.max_per_user {
            return Err(RegistryError::ConnectionLimit {
                user: handle.user.to_string(),
                limit: self.max_per_user,
            });
        }

        entries.push(handle.clone());
        let per_user = entries.len();
        let total = guard.total();
        metrics::set_ws_connections(total);

        tracing::debug!(
            user = %handle.user,
            connection_id = %handle.id,
            per_user,
            "connection registered"
        );
        Ok(true)
    }

    /// Remove exactly this connection, from its user and from every room.
    ///
    /// Returns `false` if it was not registered.
    pub async fn unregister(&self, handle: &ConnectionHandle) -> bool {
        let mut guard = self.inner.write().await;

        let mut removed = false;
        if let Some(entries) = guard.connections.get_mut(&handle.user) {
            let before = entries.len();
            entries.retain(|h| h.id != handle.id);
            removed = entries.len() != before;
            if entries.is_empty() {
                guard.connections.remove(&handle.user);
            }
        }

        guard.rooms.retain(|_, members| {
            members.retain(|h| h.id != handle.id);
            !members.is_empty()
        });

        if removed {
            let total = guard.total();
            metrics::set_ws_connections(total);
            tracing::debug!(
                user = %handle.user,
                connection_id = %handle.id,
                "connection unregistered"
            );
        }
        removed
    }

    /// Snapshot of the user's live connections
    pub async fn connections_for(&self, user: &UserKey) -> Vec<ConnectionHandle> {
        let guard = self.inner.read().await;
        guard.connections.get(user).cloned().unwrap_or_default()
    }

    /// Total live connections across all users
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.total()
    }

    /// Deliver one event to every live connection of `user`.
    ///
    /// Each connection is tried independently; returns how many accepted the
    /// frame.
    pub async fn broadcast_to<T: Serialize + ?Sized>(
        &self,
        user: &UserKey,
        event: &str,
        data: &T,
    ) -> Result<usize, RegistryError> {
        let frame =
            encode_frame(event, data).map_err(|e| RegistryError::Serialization(e.to_string()))?;
        let guard = self.inner.read().await;
        let Some(targets) = guard.connections.get(user) else {
            return Ok(0);
        };
        Ok(fan_out(targets, event, &frame))
    }

    /// Idempotent room join; rooms are scoped to the connection's tenant
    pub async fn join_room(&self, handle: &ConnectionHandle, room: &str) {
        let key = RoomKey {
            tenant_id: handle.user.tenant_id.clone(),
            room: room.to_string(),
        };
        let mut guard = self.inner.write().await;
        let members = guard.rooms.entry(key).or_default();
        if !members.iter().any(|h| h.id == handle.id) {
            members.push(handle.clone());
        }
    }

    pub async fn leave_room(&self, handle: &ConnectionHandle, room: &str) {
        let key = RoomKey {
            tenant_id: handle.user.tenant_id.clone(),
            room: room.to_string(),
        };
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.rooms.get_mut(&key) {
            members.retain(|h| h.id != handle.id);
            if members.is_empty() {
                guard.rooms.remove(&key);
            }
        }
    }

    /// Rooms with at least one member, across all tenants
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

fn fan_out(targets: &[ConnectionHandle], event: &str, frame: &str) -> usize {
    let mut delivered = 0;
    for handle in targets {
        match handle.send_frame(frame.to_string()) {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(
                user = %handle.user,
                connection_id = %handle.id,
                event,
                error = %e,
                "dropped frame for connection"
            ),
        }
    }
    delivered
}
