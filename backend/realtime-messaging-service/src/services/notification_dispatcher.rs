/// Notification Dispatcher
///
/// Resolves recipient delivery tokens and tenant push credentials, builds the
/// notification payload and calls the push gateway exactly once per
/// recipient. Nothing here is retried.
///
/// The `send_*` entry points never return an error. Every attempt ends in a
/// [`DispatchOutcome`] that callers log and discard, so a failed push cannot
/// abort the operation that triggered it.
use async_trait::async_trait;
use nova_push_gateway::{FcmLegacyClient, GatewayPayload, GatewaySendResult, PushGatewayError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::metrics;
use crate::models::{
    Message, PushNotification, ADMIN_DISPLAY_NAME, ADMIN_USER_ID, PAGE_MESSAGE, PAGE_POST,
};
use crate::services::credential_cipher::{CipherError, CredentialCipher};
use crate::services::directory::Directory;

/// Comment excerpts longer than this are cut and suffixed with `...`
pub const COMMENT_PREVIEW_CHARS: usize = 70;

/// Outbound push transport
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(
        &self,
        server_key: &str,
        payload: &GatewayPayload,
    ) -> Result<GatewaySendResult, PushGatewayError>;
}

#[async_trait]
impl PushGateway for FcmLegacyClient {
    async fn send(
        &self,
        server_key: &str,
        payload: &GatewayPayload,
    ) -> Result<GatewaySendResult, PushGatewayError> {
        FcmLegacyClient::send(self, server_key, payload).await
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("push is not configured for tenant {0}")]
    NotConfigured(String),

    #[error("directory lookup failed: {0}")]
    Lookup(String),

    #[error("push credential unreadable: {0}")]
    Credential(#[from] CipherError),

    #[error("push gateway error: {0}")]
    Gateway(String),

    #[error("push gateway rejected delivery: {0}")]
    Rejected(String),
}

/// Result of one dispatch attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered,
    /// Expected non-delivery (no token, push not configured)
    Skipped(String),
    Failed(String),
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Skipped(_) => "skipped",
            DispatchOutcome::Failed(_) => "failed",
        }
    }
}

/// A like or comment on a post, as reported by the content subsystem
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostActivity {
    pub sender_id: String,
    pub recipient_id: String,
    pub post_id: String,
    #[serde(default)]
    pub community_id: Option<String>,
    #[serde(default)]
    pub comment_text: Option<String>,
    /// Deep link to the post, forwarded as `data.url`
    #[serde(default)]
    pub url: Option<String>,
    /// Display names of users mentioned alongside the activity
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagOutcome {
    pub tag: String,
    pub outcome: DispatchOutcome,
}

/// Outcomes for the direct recipient and each tagged user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanOutReport {
    pub recipient: DispatchOutcome,
    pub tags: Vec<TagOutcome>,
}

/// Cut `text` to [`COMMENT_PREVIEW_CHARS`] characters plus an ellipsis
pub fn truncate_comment(text: &str) -> String {
    if text.chars().count() <= COMMENT_PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(COMMENT_PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Notification body for a direct message
pub fn message_body(message: &Message) -> String {
    if !message.text.trim().is_empty() {
        return message.text.clone();
    }
    if message.video_url.is_some() {
        "Sent you a video".to_string()
    } else if message.image_url.is_some() {
        "Sent you a photo".to_string()
    } else {
        String::new()
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    directory: Arc<dyn Directory>,
    gateway: Arc<dyn PushGateway>,
    cipher: CredentialCipher,
}

impl NotificationDispatcher {
    pub fn new(
        directory: Arc<dyn Directory>,
        gateway: Arc<dyn PushGateway>,
        cipher: CredentialCipher,
    ) -> Self {
        Self {
            directory,
            gateway,
            cipher,
        }
    }

    /// Decrypted push credential of the tenant; `None` if push was never configured
    pub async fn resolve_app_push_credential(
        &self,
        tenant_id: &str,
    ) -> Result<Option<String>, DispatchError> {
        let app = self
            .directory
            .app_by_id(tenant_id)
            .await
            .map_err(|e| DispatchError::Lookup(e.to_string()))?;

        let sealed = match app.and_then(|a| a.push_credential) {
            Some(s) if !s.trim().is_empty() => s,
            _ => return Ok(None),
        };

        Ok(Some(self.cipher.decrypt(&sealed)?))
    }

    /// Send one notification to one device token
    #[instrument(
        skip(self, token, notification),
        fields(tenant_id = %tenant_id, page = %notification.page)
    )]
    pub async fn dispatch(
        &self,
        tenant_id: &str,
        token: &str,
        notification: &PushNotification,
    ) -> Result<GatewaySendResult, DispatchError> {
        let credential = self
            .resolve_app_push_credential(tenant_id)
            .await?
            .ok_or_else(|| DispatchError::NotConfigured(tenant_id.to_string()))?;

        let payload = notification.to_gateway_payload(token);
        let result = self
            .gateway
            .send(&credential, &payload)
            .await
            .map_err(|e| {
                if e.is_auth_failure() {
                    warn!(tenant_id, "gateway refused the tenant push credential");
                }
                DispatchError::Gateway(e.to_string())
            })?;

        // FCM reports per-token failures inside a 200 response
        if let Some(error) = &result.error {
            return Err(DispatchError::Rejected(error.clone()));
        }

        debug!(status = result.status, message_id = ?result.message_id, "push accepted");
        Ok(result)
    }

    async fn deliver(
        &self,
        kind: &str,
        tenant_id: &str,
        token: Option<&str>,
        notification: &PushNotification,
    ) -> DispatchOutcome {
        let outcome = match token {
            None => DispatchOutcome::Skipped("recipient has no delivery token".to_string()),
            Some(token) => match self.dispatch(tenant_id, token, notification).await {
                Ok(_) => DispatchOutcome::Delivered,
                Err(e @ DispatchError::NotConfigured(_)) => DispatchOutcome::Skipped(e.to_string()),
                Err(e) => DispatchOutcome::Failed(e.to_string()),
            },
        };

        metrics::record_push_outcome(kind, outcome.label());
        match &outcome {
            DispatchOutcome::Delivered => info!(tenant_id, kind, "push delivered"),
            DispatchOutcome::Skipped(reason) => debug!(tenant_id, kind, %reason, "push skipped"),
            DispatchOutcome::Failed(reason) => warn!(tenant_id, kind, %reason, "push failed"),
        }
        outcome
    }

    async fn display_name(&self, tenant_id: &str, user_id: &str) -> Result<String, DispatchError> {
        if user_id == ADMIN_USER_ID {
            return Ok(ADMIN_DISPLAY_NAME.to_string());
        }
        let user = self
            .directory
            .user_by_id(tenant_id, user_id)
            .await
            .map_err(|e| DispatchError::Lookup(e.to_string()))?;
        Ok(user
            .map(|u| u.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| user_id.to_string()))
    }

    /// Display name and delivery token of a recipient; the admin inbox has no device
    async fn recipient_profile(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<(String, Option<String>), DispatchError> {
        if user_id == ADMIN_USER_ID {
            return Ok((ADMIN_DISPLAY_NAME.to_string(), None));
        }
        let user = self
            .directory
            .user_by_id(tenant_id, user_id)
            .await
            .map_err(|e| DispatchError::Lookup(e.to_string()))?;
        let token = user
            .as_ref()
            .and_then(|u| u.delivery_token())
            .map(str::to_string);
        let name = user
            .map(|u| u.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| user_id.to_string());
        Ok((name, token))
    }

    /// Push a persisted direct message to the recipient's devices
    #[instrument(
        skip(self, message),
        fields(tenant_id = %tenant_id, message_id = ?message.id)
    )]
    pub async fn send_message_notification(
        &self,
        tenant_id: &str,
        message: &Message,
    ) -> DispatchOutcome {
        if message.is_to_admin() {
            let outcome = DispatchOutcome::Skipped("admin inbox has no device".to_string());
            metrics::record_push_outcome("message", outcome.label());
            return outcome;
        }

        let resolved = async {
            let sender = self.display_name(tenant_id, &message.from_id).await?;
            let (recipient, token) = self.recipient_profile(tenant_id, &message.to_id).await?;
            Ok::<_, DispatchError>((sender, recipient, token))
        }
        .await;

        match resolved {
            Ok((sender, recipient, token)) => {
                let notification =
                    PushNotification::new(sender, message_body(message), PAGE_MESSAGE)
                        .with_recipient(recipient);
                self.deliver("message", tenant_id, token.as_deref(), &notification)
                    .await
            }
            Err(e) => {
                warn!(tenant_id, error = %e, "message notification lookup failed");
                metrics::record_push_outcome("message", "failed");
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Notify a post author that `sender_id` liked it, plus any mentioned users
    #[instrument(skip(self, activity), fields(tenant_id = %tenant_id, post_id = %activity.post_id))]
    pub async fn send_like_notification(
        &self,
        tenant_id: &str,
        activity: &PostActivity,
    ) -> FanOutReport {
        self.send_post_activity("like", tenant_id, activity, "liked your post".to_string())
            .await
    }

    /// Notify a post author of a new comment, plus any mentioned users
    #[instrument(skip(self, activity), fields(tenant_id = %tenant_id, post_id = %activity.post_id))]
    pub async fn send_comment_notification(
        &self,
        tenant_id: &str,
        activity: &PostActivity,
    ) -> FanOutReport {
        let body = match activity.comment_text.as_deref() {
            Some(text) if !text.trim().is_empty() => {
                format!("commented: {}", truncate_comment(text))
            }
            _ => "commented on your post".to_string(),
        };
        self.send_post_activity("comment", tenant_id, activity, body)
            .await
    }

    async fn send_post_activity(
        &self,
        kind: &str,
        tenant_id: &str,
        activity: &PostActivity,
        body: String,
    ) -> FanOutReport {
        let sender = match self.display_name(tenant_id, &activity.sender_id).await {
            Ok(name) => name,
            Err(e) => {
                // Without a sender name nothing can be formatted
                warn!(tenant_id, error = %e, "sender lookup failed");
                let reason = e.to_string();
                metrics::record_push_outcome(kind, "failed");
                return FanOutReport {
                    recipient: DispatchOutcome::Failed(reason.clone()),
                    tags: activity
                        .tags
                        .iter()
                        .map(|tag| TagOutcome {
                            tag: tag.clone(),
                            outcome: DispatchOutcome::Failed(reason.clone()),
                        })
                        .collect(),
                };
            }
        };

        let notification = PushNotification::new(&sender, body, PAGE_POST)
            .with_post(&activity.post_id, activity.community_id.clone())
            .with_url(activity.url.clone());

        let recipient = match self.recipient_profile(tenant_id, &activity.recipient_id).await {
            Ok((name, token)) => {
                let notification = notification.with_recipient(name);
                self.deliver(kind, tenant_id, token.as_deref(), &notification)
                    .await
            }
            Err(e) => {
                warn!(tenant_id, error = %e, "recipient lookup failed");
                metrics::record_push_outcome(kind, "failed");
                DispatchOutcome::Failed(e.to_string())
            }
        };

        let mention_body = match activity.comment_text.as_deref() {
            Some(text) if !text.trim().is_empty() => {
                format!("mentioned you: {}", truncate_comment(text))
            }
            _ => "mentioned you in a post".to_string(),
        };
        let mention = PushNotification::new(&sender, mention_body, PAGE_POST)
            .with_post(&activity.post_id, activity.community_id.clone())
            .with_url(activity.url.clone());

        let mut tags = Vec::with_capacity(activity.tags.len());
        for tag in &activity.tags {
            let outcome = self.send_mention(tenant_id, tag, &mention).await;
            tags.push(TagOutcome {
                tag: tag.clone(),
                outcome,
            });
        }

        FanOutReport { recipient, tags }
    }

    /// Tags are display names; each one is resolved and delivered independently
    async fn send_mention(
        &self,
        tenant_id: &str,
        tag: &str,
        notification: &PushNotification,
    ) -> DispatchOutcome {
        match self.directory.user_by_name(tenant_id, tag).await {
            Ok(Some(user)) => {
                self.deliver("mention", tenant_id, user.delivery_token(), notification)
                    .await
            }
            Ok(None) => {
                debug!(tenant_id, tag, "mentioned user not found");
                metrics::record_push_outcome("mention", "skipped");
                DispatchOutcome::Skipped(format!("no user named {tag}"))
            }
            Err(e) => {
                warn!(tenant_id, tag, error = %e, "mention lookup failed");
                metrics::record_push_outcome("mention", "failed");
                DispatchOutcome::Failed(format!("directory lookup failed: {e}"))
            }
        }
    }
}
