//! Translates connection lifecycle and inbound events into registry,
//! conversation store and dispatcher calls.
//!
//! Per connection: `Connecting -> Connected -> Disconnected`. The transport
//! layer calls [`EventRouter::on_connect`] once the handshake identity is
//! verified, feeds inbound events to [`EventRouter::handle`] one at a time,
//! and calls [`EventRouter::on_disconnect`] exactly once at the end.

use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::Message;
use crate::services::{ConversationStore, DispatchOutcome, NotificationDispatcher};

use super::message_types::{events, ErrorPayload, MessageEnvelope, WsInboundEvent};
use super::{ConnectionHandle, ConnectionRegistry, RegistryError, UserKey};

/// A persisted message plus the detached push attempt for its recipient
pub struct SendOutcome {
    pub message: Message,
    pub notification: JoinHandle<DispatchOutcome>,
}

#[derive(Clone)]
pub struct EventRouter {
    registry: ConnectionRegistry,
    conversations: ConversationStore,
    dispatcher: NotificationDispatcher,
}

impl EventRouter {
    pub fn new(
        registry: ConnectionRegistry,
        conversations: ConversationStore,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            registry,
            conversations,
            dispatcher,
        }
    }

    /// Register the connection and start its snapshot push.
    ///
    /// The snapshot runs as its own task and never fails the connection; the
    /// returned handle lets the transport abort it on early disconnect.
    pub async fn on_connect(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<JoinHandle<()>, RegistryError> {
        self.registry.register(handle.clone()).await?;
        info!(
            tenant_id = %handle.user().tenant_id,
            user_id = %handle.user().user_id,
            connection_id = %handle.id(),
            "connection established"
        );
        Ok(self.spawn_snapshot(handle.clone()))
    }

    fn spawn_snapshot(&self, handle: ConnectionHandle) -> JoinHandle<()> {
        let conversations = self.conversations.clone();
        spawn_supervised("snapshot", || (), async move {
            let user = handle.user().clone();
            let result = async {
                let chats = conversations
                    .conversations_for(&user.tenant_id, &user.user_id)
                    .await?;
                handle.send_event(events::ALL_CHATS, &chats)?;
                Ok::<usize, AppError>(chats.len())
            }
            .await;

            match result {
                Ok(count) => debug!(
                    tenant_id = %user.tenant_id,
                    user_id = %user.user_id,
                    connection_id = %handle.id(),
                    conversations = count,
                    "snapshot pushed"
                ),
                Err(e) => warn!(
                    tenant_id = %user.tenant_id,
                    user_id = %user.user_id,
                    connection_id = %handle.id(),
                    error = %e,
                    "snapshot push failed"
                ),
            }
        })
    }

    /// `Connected -> Disconnected`
    pub async fn on_disconnect(&self, handle: &ConnectionHandle) -> bool {
        let removed = self.registry.unregister(handle).await;
        info!(
            tenant_id = %handle.user().tenant_id,
            user_id = %handle.user().user_id,
            connection_id = %handle.id(),
            removed,
            "connection closed"
        );
        removed
    }

    /// Run one inbound event; failures go back to the connection as an `error` frame
    pub async fn handle(&self, conn: &ConnectionHandle, event: WsInboundEvent) {
        let name = event.name();
        metrics::record_ws_event(name);

        let result = match event {
            WsInboundEvent::Message(envelope) => {
                self.on_send_message(conn, envelope).await.map(|_| ())
            }
            WsInboundEvent::Read(envelope) => self.on_mark_read(conn, envelope).await.map(|_| ()),
            WsInboundEvent::JoinRoom(room) => self.on_join_room(conn, &room).await,
            WsInboundEvent::LeaveRoom(room) => self.on_leave_room(conn, &room).await,
        };

        if let Err(err) = result {
            warn!(
                tenant_id = %conn.user().tenant_id,
                user_id = %conn.user().user_id,
                connection_id = %conn.id(),
                event = name,
                error = %err,
                "inbound event rejected"
            );
            Self::reject(conn, &err, Some(name));
        }
    }

    pub fn reject(conn: &ConnectionHandle, err: &AppError, event: Option<&str>) {
        let payload = ErrorPayload::from_app_error(err, event);
        if let Err(e) = conn.send_event(events::ERROR, &payload) {
            debug!(connection_id = %conn.id(), error = %e, "could not deliver error frame");
        }
    }

    fn authorize(conn: &ConnectionHandle, tenant_id: &str) -> AppResult<()> {
        if conn.user().tenant_id != tenant_id {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    pub async fn on_send_message(
        &self,
        conn: &ConnectionHandle,
        envelope: MessageEnvelope,
    ) -> AppResult<SendOutcome> {
        Self::authorize(conn, &envelope.tenant_id)?;
        if envelope.message.from_id != conn.user().user_id {
            return Err(AppError::Forbidden);
        }
        self.send_message(&envelope.tenant_id, envelope.message).await
    }

    /// Persist, emit to both parties' live connections, then start the push.
    ///
    /// The push is spawned only after live delivery has been queued and is
    /// never awaited here.
    pub async fn send_message(
        &self,
        tenant_id: &str,
        mut message: Message,
    ) -> AppResult<SendOutcome> {
        message.validate()?;
        message.id = None;
        message.read = false;

        let persisted = self.conversations.send(tenant_id, message).await?;
        metrics::record_message_persisted();

        let sender = UserKey::new(tenant_id, &persisted.from_id);
        let receipts = self.emit(&sender, events::MSG_SENT, &persisted).await;

        let mut live = 0;
        if persisted.to_id != persisted.from_id {
            let recipient = UserKey::new(tenant_id, &persisted.to_id);
            live = self.emit(&recipient, events::MESSAGE, &persisted).await;
        }

        info!(
            tenant_id,
            message_id = ?persisted.id,
            receipts,
            live,
            "message sent"
        );

        let notification = self.spawn_message_notification(tenant_id, persisted.clone());
        Ok(SendOutcome {
            message: persisted,
            notification,
        })
    }

    fn spawn_message_notification(
        &self,
        tenant_id: &str,
        message: Message,
    ) -> JoinHandle<DispatchOutcome> {
        let dispatcher = self.dispatcher.clone();
        let tenant_id = tenant_id.to_string();
        let on_panic = || {
            metrics::record_push_outcome("message", "failed");
            DispatchOutcome::Failed("notification task panicked".to_string())
        };
        spawn_supervised("message_notification", on_panic, async move {
            dispatcher
                .send_message_notification(&tenant_id, &message)
                .await
        })
    }

    /// Mark a received message as read and tell its sender
    pub async fn on_mark_read(
        &self,
        conn: &ConnectionHandle,
        envelope: MessageEnvelope,
    ) -> AppResult<Message> {
        Self::authorize(conn, &envelope.tenant_id)?;
        let id = envelope
            .message
            .id
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("message id is required".to_string()))?;

        let stored = self.conversations.get(&envelope.tenant_id, id).await?;
        if stored.to_id != conn.user().user_id {
            return Err(AppError::Forbidden);
        }

        let updated = self
            .conversations
            .mark_read(&envelope.tenant_id, &envelope.message)
            .await?;

        let sender = UserKey::new(&envelope.tenant_id, &updated.from_id);
        self.emit(&sender, events::READ, &updated).await;
        Ok(updated)
    }

    pub async fn on_join_room(&self, conn: &ConnectionHandle, room: &str) -> AppResult<()> {
        let room = room.trim();
        if room.is_empty() {
            return Err(AppError::BadRequest("room id is required".to_string()));
        }
        self.registry.join_room(conn, room).await;
        debug!(connection_id = %conn.id(), room, "joined room");
        Ok(())
    }

    pub async fn on_leave_room(&self, conn: &ConnectionHandle, room: &str) -> AppResult<()> {
        self.registry.leave_room(conn, room.trim()).await;
        debug!(connection_id = %conn.id(), room, "left room");
        Ok(())
    }

    async fn emit<T: Serialize + ?Sized>(&self, user: &UserKey, event: &str, data: &T) -> usize {
        match self.registry.broadcast_to(user, event, data).await {
            Ok(delivered) => delivered,
            Err(e) => {
                error!(user = %user, event, error = %e, "broadcast failed");
                0
            }
        }
    }
}

/// Spawn a detached task whose panic is logged and replaced by `on_panic()`
fn spawn_supervised<F, P>(task: &'static str, on_panic: P, fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    P: FnOnce() -> F::Output + Send + 'static,
{
    tokio::spawn(async move {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(output) => output,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown".to_string());
                error!(task, %reason, "background task panicked");
                on_panic()
            }
        }
    })
}
