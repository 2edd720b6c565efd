use nova_push_gateway::{GatewayNotification, GatewayPayload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client-side routing hints carried in `data.page`
pub const PAGE_MESSAGE: &str = "message";
pub const PAGE_POST: &str = "post";

/// Transient notification value, built per dispatch and never stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub page: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
}

impl PushNotification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, page: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            page: page.into(),
            post_id: None,
            community_id: None,
            url: None,
            recipient_name: None,
        }
    }

    pub fn with_post(mut self, post_id: impl Into<String>, community_id: Option<String>) -> Self {
        self.post_id = Some(post_id.into());
        self.community_id = community_id;
        self
    }

    /// Deep link opened when the notification is tapped
    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_recipient(mut self, name: impl Into<String>) -> Self {
        self.recipient_name = Some(name.into());
        self
    }

    /// Gateway body addressed to one device token
    pub fn to_gateway_payload(&self, token: &str) -> GatewayPayload {
        let mut data = BTreeMap::new();
        data.insert("title".to_string(), self.title.clone());
        data.insert("body".to_string(), self.body.clone());
        data.insert("page".to_string(), self.page.clone());
        if let Some(post_id) = &self.post_id {
            data.insert("postId".to_string(), post_id.clone());
        }
        if let Some(community_id) = &self.community_id {
            data.insert("communityId".to_string(), community_id.clone());
        }
        if let Some(url) = &self.url {
            data.insert("url".to_string(), url.clone());
        }
        if let Some(name) = &self.recipient_name {
            data.insert("recipientName".to_string(), name.clone());
        }

        GatewayPayload {
            to: token.to_string(),
            data,
            notification: GatewayNotification::new(&self.title, &self.body),
        }
    }
}
