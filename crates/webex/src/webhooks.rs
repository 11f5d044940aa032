use std::collections::HashMap;
use std::sync::Arc;

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::events::IncomingEvent;
use crate::messages::MessagesApi;

pub const MESSAGES_RESOURCE: &str = "messages";
pub const ATTACHMENT_ACTIONS_RESOURCE: &str = "attachmentActions";

/// The envelope the platform posts to a webhook target. It only carries ids;
/// the content has to be fetched.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookNotification {
    #[serde(default)]
    pub id: Option<String>,
    pub resource: String,
    pub event: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    pub data: NotificationData,
}

impl WebhookNotification {
    /// Queue key for the runner. Known before any fetch, so events from one
    /// sender keep their arrival order.
    pub fn sender_key(&self) -> String {
        self.data
            .person_id
            .clone()
            .or_else(|| self.actor_id.clone())
            .unwrap_or_else(|| format!("unattributed:{}", self.data.id))
    }

    /// Stable id for the occurrence. Notification ids identify the webhook,
    /// not the occurrence.
    pub fn occurrence_id(&self) -> String {
        format!("{}:{}", self.resource, self.data.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub id: String,
    #[serde(default)]
    pub person_id: Option<String>,
    #[serde(default)]
    pub person_email: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentAction {
    pub id: String,
    #[serde(default)]
    pub person_id: String,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

/// Turns webhook notifications into dispatchable events.
pub struct EventHydrator {
    client: Arc<ApiClient>,
    messages: MessagesApi,
    bot_person_id: Option<String>,
}

impl EventHydrator {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { messages: MessagesApi::new(client.clone()), client, bot_person_id: None }
    }

    /// Messages authored by this identity are dropped before any fetch.
    pub fn ignoring_author(mut self, bot_person_id: impl Into<String>) -> Self {
        self.bot_person_id = Some(bot_person_id.into());
        self
    }

    /// Cheap check on the envelope alone: whether hydrating could yield an event.
    pub fn accepts(&self, notification: &WebhookNotification) -> bool {
        if notification.event != "created" {
            return false;
        }
        match notification.resource.as_str() {
            MESSAGES_RESOURCE => !self.authored_by_bot(notification.data.person_id.as_deref()),
            ATTACHMENT_ACTIONS_RESOURCE => true,
            other => {
                debug!(event_name = "webex.webhooks.unsupported", resource = %other, "ignoring notification");
                false
            }
        }
    }

    pub async fn hydrate(
        &self,
        notification: &WebhookNotification,
    ) -> Result<Option<IncomingEvent>, ApiError> {
        if !self.accepts(notification) {
            return Ok(None);
        }

        match notification.resource.as_str() {
            MESSAGES_RESOURCE => self.hydrate_message(notification).await,
            _ => self.hydrate_submission(notification).await.map(Some),
        }
    }

    async fn hydrate_message(
        &self,
        notification: &WebhookNotification,
    ) -> Result<Option<IncomingEvent>, ApiError> {
        let (message, raw) = self.messages.get(&notification.data.id).await?;
        if self.authored_by_bot(Some(message.person_id.as_str())) {
            return Ok(None);
        }

        let mut event = IncomingEvent::text(
            notification.occurrence_id(),
            message.person_id,
            message.room_id,
            message.text.unwrap_or_default(),
        )
        .with_raw(raw);
        event.sender_email = message.person_email;
        Ok(Some(event))
    }

    async fn hydrate_submission(
        &self,
        notification: &WebhookNotification,
    ) -> Result<IncomingEvent, ApiError> {
        let raw: Value = self
            .client
            .call_json(&ApiRequest::get(format!("/attachment/actions/{}", notification.data.id)))
            .await?;
        let action: AttachmentAction = serde_json::from_value(raw.clone())
            .map_err(|error| ApiError::Decode(error.to_string()))?;

        let inputs: HashMap<String, String> = action
            .inputs
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        Ok(IncomingEvent::card_submission(
            notification.occurrence_id(),
            action.person_id,
            action.room_id,
            action.message_id,
            inputs,
        )
        .with_raw(raw))
    }

    fn authored_by_bot(&self, person_id: Option<&str>) -> bool {
        matches!((&self.bot_person_id, person_id), (Some(bot), Some(author)) if bot == author)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub target_url: String,
    pub resource: String,
    pub event: String,
}

pub struct WebhooksApi {
    client: Arc<ApiClient>,
}

impl WebhooksApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Webhook>, ApiError> {
        self.client.list_items(ApiRequest::get("/webhooks").with_query("max", "100")).try_collect().await
    }

    pub async fn create(&self, webhook: &Webhook) -> Result<Webhook, ApiError> {
        let body = json!({
            "name": webhook.name,
            "targetUrl": webhook.target_url,
            "resource": webhook.resource,
            "event": webhook.event,
        });
        self.client.call_json(&ApiRequest::post("/webhooks", body)).await
    }

    /// Creates the message and card-submission webhooks for `target_url` unless
    /// they already exist. Returns the resources that were created.
    pub async fn ensure_registered(&self, name: &str, target_url: &str) -> Result<Vec<String>, ApiError> {
        let existing = self.list().await?;
        let mut created = Vec::new();

        for resource in [MESSAGES_RESOURCE, ATTACHMENT_ACTIONS_RESOURCE] {
            let present = existing.iter().any(|webhook| {
                webhook.resource == resource
                    && webhook.event == "created"
                    && webhook.target_url == target_url
            });
            if present {
                continue;
            }
            self.create(&Webhook {
                id: String::new(),
                name: format!("{name} {resource}"),
                target_url: target_url.to_owned(),
                resource: resource.to_owned(),
                event: "created".to_owned(),
            })
            .await?;
            info!(
                event_name = "webex.webhooks.registered",
                resource = %resource,
                target_url = %target_url,
                "webhook registered"
            );
            created.push(resource.to_owned());
        }

        Ok(created)
    }
}
