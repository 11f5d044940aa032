use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::responder::ReplyContent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    Room(String),
    PersonId(String),
    PersonEmail(String),
}

impl Recipient {
    fn field(&self) -> (&'static str, &str) {
        match self {
            Self::Room(id) => ("roomId", id),
            Self::PersonId(id) => ("toPersonId", id),
            Self::PersonEmail(email) => ("toPersonEmail", email),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub person_id: String,
    #[serde(default)]
    pub person_email: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

pub fn message_body(recipient: &Recipient, content: &ReplyContent) -> Value {
    let mut body = Map::new();
    let (field, target) = recipient.field();
    body.insert(field.to_owned(), Value::String(target.to_owned()));

    match content {
        ReplyContent::Markdown(markdown) => {
            body.insert("markdown".to_owned(), Value::String(markdown.clone()));
        }
        ReplyContent::Card(card) => {
            body.insert("markdown".to_owned(), Value::String(card.fallback_text.clone()));
            body.insert("attachments".to_owned(), json!([card.attachment()]));
        }
    }

    Value::Object(body)
}

#[derive(Clone)]
pub struct MessagesApi {
    client: Arc<ApiClient>,
}

impl MessagesApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn send(&self, recipient: &Recipient, content: &ReplyContent) -> Result<Message, ApiError> {
        let request = ApiRequest::post("/messages", message_body(recipient, content));
        self.client.call_json(&request).await
    }

    /// The message and its untouched platform payload.
    pub async fn get(&self, message_id: &str) -> Result<(Message, Value), ApiError> {
        let raw: Value =
            self.client.call_json(&ApiRequest::get(format!("/messages/{message_id}"))).await?;
        let message =
            serde_json::from_value(raw.clone()).map_err(|error| ApiError::Decode(error.to_string()))?;
        Ok((message, raw))
    }

    pub async fn delete(&self, message_id: &str) -> Result<(), ApiError> {
        self.client.call(&ApiRequest::delete(format!("/messages/{message_id}"))).await.map(|_| ())
    }
}
