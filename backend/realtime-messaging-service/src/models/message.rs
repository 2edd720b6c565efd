use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Reserved recipient id of the tenant's administrative inbox
pub const ADMIN_USER_ID: &str = "admin";

/// Display label used for the admin inbox in notifications
pub const ADMIN_DISPLAY_NAME: &str = "Admin";

pub const MAX_TEXT_CHARS: usize = 5000;

/// Direct message as stored in the tenant's `messages` collection.
///
/// Field names on the wire and in the store are camelCase. `id` is absent on
/// inbound messages and always present once persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from_id: String,
    pub to_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
}

impl Message {
    pub fn new(
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            from_id: from_id.into(),
            to_id: to_id.into(),
            image_url: None,
            video_url: None,
            text: text.into(),
            read: false,
            time: Utc::now(),
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.from_id == user_id || self.to_id == user_id
    }

    /// The id on the other side of the pair, seen from `user_id`
    pub fn counterpart_of(&self, user_id: &str) -> &str {
        if self.from_id == user_id {
            &self.to_id
        } else {
            &self.from_id
        }
    }

    pub fn has_media(&self) -> bool {
        self.image_url.is_some() || self.video_url.is_some()
    }

    pub fn is_to_admin(&self) -> bool {
        self.to_id == ADMIN_USER_ID
    }

    /// Checks an inbound message before it is persisted
    pub fn validate(&self) -> Result<(), AppError> {
        if self.from_id.trim().is_empty() || self.to_id.trim().is_empty() {
            return Err(AppError::BadRequest(
                "fromId and toId are required".to_string(),
            ));
        }
        if self.text.trim().is_empty() && !self.has_media() {
            return Err(AppError::BadRequest(
                "message needs text, imageUrl or videoUrl".to_string(),
            ));
        }
        if self.text.chars().count() > MAX_TEXT_CHARS {
            return Err(AppError::BadRequest(format!(
                "text exceeds {MAX_TEXT_CHARS} characters"
            )));
        }
        Ok(())
    }
}

/// Per-user view of one 1:1 thread. Derived on every read, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// The counterpart
    pub to_id: String,
    /// Most recent first
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn latest_time(&self) -> Option<DateTime<Utc>> {
        self.messages.first().map(|m| m.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_is_camel_case() {
        let msg: Message = serde_json::from_value(json!({
            "fromId": "alice",
            "toId": "bob",
            "text": "hi",
            "time": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(msg.from_id, "alice");
        assert!(!msg.read);
        assert!(msg.id.is_none());

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["toId"], "bob");
        assert!(value.get("id").is_none());
        assert!(value.get("imageUrl").is_none());
    }

    #[test]
    fn test_counterpart_of() {
        let msg = Message::new("alice", "bob", "hi");
        assert_eq!(msg.counterpart_of("alice"), "bob");
        assert_eq!(msg.counterpart_of("bob"), "alice");

        let note_to_self = Message::new("alice", "alice", "todo");
        assert_eq!(note_to_self.counterpart_of("alice"), "alice");
    }

    #[test]
    fn test_validate() {
        assert!(Message::new("alice", "bob", "hi").validate().is_ok());
        assert!(Message::new("", "bob", "hi").validate().is_err());
        assert!(Message::new("alice", "bob", "  ").validate().is_err());

        let mut photo = Message::new("alice", "bob", "");
        photo.image_url = Some("https://cdn.example.com/a.png".into());
        assert!(photo.validate().is_ok());

        let long = Message::new("alice", "bob", "x".repeat(MAX_TEXT_CHARS + 1));
        assert!(long.validate().is_err());
    }
}
