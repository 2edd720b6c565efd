//! Message persistence and per-user conversation assembly.
//!
//! The document store has no OR predicate, so a user's conversations are
//! built from two equality queries (`toId == user`, `fromId == user`) run
//! concurrently and merged here.

use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message};
use crate::store::{to_document_data, Collection, DocumentData, StoreClient};

pub const MESSAGES_COLLECTION: &str = "messages";

#[derive(Clone)]
pub struct ConversationStore {
    store: StoreClient,
}

impl ConversationStore {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    fn messages(&self, tenant_id: &str) -> AppResult<Collection> {
        Ok(self.store.collection(tenant_id, MESSAGES_COLLECTION)?)
    }

    /// Persist a new message; the returned copy carries the generated id
    #[instrument(
        skip(self, message),
        fields(tenant_id = %tenant_id, from_id = %message.from_id, to_id = %message.to_id)
    )]
    pub async fn send(&self, tenant_id: &str, message: Message) -> AppResult<Message> {
        let messages = self.messages(tenant_id)?;
        let id = messages.add(to_document_data(&message)?).await?;
        debug!(message_id = %id, "message persisted");
        Ok(Message {
            id: Some(id),
            ..message
        })
    }

    pub async fn get(&self, tenant_id: &str, message_id: &str) -> AppResult<Message> {
        let messages = self.messages(tenant_id)?;
        let stored = messages
            .doc(message_id)
            .get()
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(stored.into_typed()?)
    }

    /// Flip `read` on a stored message.
    ///
    /// Only the `read` field is written, so sender, recipient, text and time
    /// stay as stored no matter what the caller passed. The update never
    /// recreates a message deleted in the meantime; that case is `NotFound`.
    #[instrument(skip(self, message), fields(tenant_id = %tenant_id))]
    pub async fn mark_read(&self, tenant_id: &str, message: &Message) -> AppResult<Message> {
        let id = message
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("message id is required".to_string()))?;

        let mut patch = DocumentData::new();
        patch.insert("read".to_string(), Value::Bool(true));

        let stored = self.messages(tenant_id)?.doc(id).update(patch).await?;
        Ok(stored.into_typed()?)
    }

    /// All conversations of `user_id`, one per counterpart.
    ///
    /// Fails as a whole if either underlying query fails.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id))]
    pub async fn conversations_for(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> AppResult<Vec<Conversation>> {
        let messages = self.messages(tenant_id)?;
        let incoming = messages.where_eq("toId", json!(user_id));
        let outgoing = messages.where_eq("fromId", json!(user_id));

        let (received, sent) = tokio::try_join!(incoming.get(), outgoing.get())?;

        let mut all = Vec::with_capacity(received.len() + sent.len());
        for doc in received.into_iter().chain(sent) {
            all.push(doc.into_typed::<Message>()?);
        }

        Ok(assemble_conversations(user_id, all))
    }

    /// The single conversation between `user_id` and `counterpart_id`; empty if none
    pub async fn conversation_with(
        &self,
        tenant_id: &str,
        user_id: &str,
        counterpart_id: &str,
    ) -> AppResult<Conversation> {
        let conversation = self
            .conversations_for(tenant_id, user_id)
            .await?
            .into_iter()
            .find(|c| c.to_id == counterpart_id)
            .unwrap_or_else(|| Conversation {
                to_id: counterpart_id.to_string(),
                messages: Vec::new(),
            });
        Ok(conversation)
    }

    /// Delete a message; only its sender may do so
    #[instrument(skip(self), fields(tenant_id = %tenant_id, message_id = %message_id))]
    pub async fn delete(
        &self,
        tenant_id: &str,
        message_id: &str,
        requester_id: &str,
    ) -> AppResult<()> {
        let messages = self.messages(tenant_id)?;
        let doc = messages.doc(message_id);
        let stored = doc.get().await?.ok_or(AppError::NotFound)?;

        if stored.field_str("fromId") != Some(requester_id) {
            return Err(AppError::Forbidden);
        }

        doc.delete().await?;
        Ok(())
    }
}

/// Group messages by counterpart, newest first within each group.
///
/// Messages returned by both queries (addressed to oneself) are kept once.
/// Groups come back with the most recently active first, but callers should
/// not rely on cross-group order.
pub fn assemble_conversations(user_id: &str, messages: Vec<Message>) -> Vec<Conversation> {
    let mut seen = HashSet::new();
    let mut groups: HashMap<String, Vec<Message>> = HashMap::new();

    for message in messages {
        if let Some(id) = &message.id {
            if !seen.insert(id.clone()) {
                continue;
            }
        }
        if !message.involves(user_id) {
            continue;
        }
        let counterpart = message.counterpart_of(user_id).to_string();
        groups.entry(counterpart).or_default().push(message);
    }

    let mut conversations: Vec<Conversation> = groups
        .into_iter()
        .map(|(to_id, mut messages)| {
            messages.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| b.id.cmp(&a.id)));
            Conversation { to_id, messages }
        })
        .collect();

    conversations.sort_by(|a, b| {
        b.latest_time()
            .cmp(&a.latest_time())
            .then_with(|| a.to_id.cmp(&b.to_id))
    });
    conversations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn at(from: &str, to: &str, secs: i64) -> Message {
        let mut msg = Message::new(from, to, format!("t={secs}"));
        msg.time = Utc.timestamp_opt(secs, 0).unwrap();
        msg
    }

    fn store() -> ConversationStore {
        ConversationStore::new(StoreClient::new(Arc::new(MemoryDocumentStore::new())))
    }

    #[test]
    fn test_assemble_orders_within_group() {
        let conversations = assemble_conversations(
            "a",
            vec![at("a", "b", 100), at("b", "a", 50), at("a", "b", 75)],
        );

        assert_eq!(conversations.len(), 1);
        let times: Vec<i64> = conversations[0]
            .messages
            .iter()
            .map(|m| m.time.timestamp())
            .collect();
        assert_eq!(times, vec![100, 75, 50]);
    }

    #[test]
    fn test_assemble_groups_by_counterpart() {
        let conversations = assemble_conversations(
            "a",
            vec![at("a", "b", 1), at("c", "a", 2), at("b", "a", 3), at("a", "admin", 4)],
        );

        let mut keys: Vec<&str> = conversations.iter().map(|c| c.to_id.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["admin", "b", "c"]);
        let total: usize = conversations.iter().map(|c| c.messages.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_assemble_dedups_self_addressed() {
        let mut note = at("a", "a", 10);
        note.id = Some("m1".into());
        let conversations = assemble_conversations("a", vec![note.clone(), note]);

        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].to_id, "a");
        assert_eq!(conversations[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_send_assigns_id() {
        let store = store();
        let sent = store.send("t1", Message::new("a", "b", "hi")).await.unwrap();
        assert!(sent.id.is_some());
        assert_eq!(sent.text, "hi");

        let conversations = store.conversations_for("t1", "b").await.unwrap();
        assert_eq!(conversations[0].messages[0].id, sent.id);
    }

    #[tokio::test]
    async fn test_mark_read_only_touches_read() {
        let store = store();
        let sent = store.send("t1", at("a", "b", 42)).await.unwrap();

        let mut tampered = sent.clone();
        tampered.text = "rewritten".into();
        tampered.from_id = "mallory".into();
        let updated = store.mark_read("t1", &tampered).await.unwrap();

        assert!(updated.read);
        assert_eq!(updated.text, sent.text);
        assert_eq!(updated.from_id, "a");
        assert_eq!(updated.to_id, "b");
        assert_eq!(updated.time, sent.time);
    }

    #[tokio::test]
    async fn test_mark_read_unknown_message() {
        let store = store();
        let mut ghost = Message::new("a", "b", "x");
        assert!(matches!(
            store.mark_read("t1", &ghost).await,
            Err(AppError::BadRequest(_))
        ));
        ghost.id = Some("missing".into());
        assert!(matches!(
            store.mark_read("t1", &ghost).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_conversations_are_tenant_scoped() {
        let store = store();
        store.send("t1", Message::new("a", "b", "one")).await.unwrap();
        assert!(store.conversations_for("t2", "a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conversation_with() {
        let store = store();
        store.send("t1", Message::new("a", "b", "one")).await.unwrap();
        store.send("t1", Message::new("c", "a", "two")).await.unwrap();

        let with_b = store.conversation_with("t1", "a", "b").await.unwrap();
        assert_eq!(with_b.messages.len(), 1);
        let with_d = store.conversation_with("t1", "a", "d").await.unwrap();
        assert_eq!(with_d.to_id, "d");
        assert!(with_d.messages.is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_sender() {
        let store = store();
        let sent = store.send("t1", Message::new("a", "b", "oops")).await.unwrap();
        let id = sent.id.unwrap();

        assert!(matches!(
            store.delete("t1", &id, "b").await,
            Err(AppError::Forbidden)
        ));
        store.delete("t1", &id, "a").await.unwrap();
        assert!(matches!(
            store.delete("t1", &id, "a").await,
            Err(AppError::NotFound)
        ));
        assert!(store.conversations_for("t1", "a").await.unwrap().is_empty());
    }
}
