use async_trait::async_trait;

use crate::api::ApiError;
use crate::cards::CardMessage;
use crate::events::IncomingEvent;
use crate::messages::{MessagesApi, Recipient};

#[derive(Clone, Debug, PartialEq)]
pub enum ReplyContent {
    Markdown(String),
    Card(CardMessage),
}

impl ReplyContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Markdown(text.into())
    }

    pub fn info(text: impl AsRef<str>) -> Self {
        Self::Markdown(quote_block("info", text.as_ref()))
    }

    pub fn warning(text: impl AsRef<str>) -> Self {
        Self::Markdown(quote_block("warning", text.as_ref()))
    }

    pub fn danger(text: impl AsRef<str>) -> Self {
        Self::Markdown(quote_block("danger", text.as_ref()))
    }

    pub fn card(card: CardMessage) -> Self {
        Self::Card(card)
    }

    /// Plain-text rendering, used in logs and by clients without card support.
    pub fn summary(&self) -> &str {
        match self {
            Self::Markdown(text) => text,
            Self::Card(card) => &card.fallback_text,
        }
    }
}

fn quote_block(class: &str, text: &str) -> String {
    format!("<blockquote class=\"{class}\">{text}</blockquote>")
}

/// Sends replies back to where an event came from.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, event: &IncomingEvent, content: &ReplyContent) -> Result<(), ApiError>;

    /// Removes the message the sender was answering, if the event names one.
    async fn delete_prompt(&self, event: &IncomingEvent) -> Result<(), ApiError>;
}

pub struct WebexResponder {
    messages: MessagesApi,
}

impl WebexResponder {
    pub fn new(messages: MessagesApi) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl Responder for WebexResponder {
    async fn reply(&self, event: &IncomingEvent, content: &ReplyContent) -> Result<(), ApiError> {
        self.messages.send(&Recipient::Room(event.room_id.clone()), content).await.map(|_| ())
    }

    async fn delete_prompt(&self, event: &IncomingEvent) -> Result<(), ApiError> {
        match &event.prompt_message_id {
            Some(message_id) => self.messages.delete(message_id).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{ReplyContent, Responder};
    use crate::api::ApiError;
    use crate::events::IncomingEvent;

    #[derive(Clone, Debug, PartialEq)]
    pub struct SentReply {
        pub sender_id: String,
        pub room_id: String,
        pub content: ReplyContent,
    }

    #[derive(Default)]
    pub struct RecordingResponder {
        pub replies: Mutex<Vec<SentReply>>,
        pub deleted: Mutex<Vec<String>>,
        pub fail_replies: bool,
        pub fail_deletes: bool,
    }

    impl RecordingResponder {
        pub async fn replies(&self) -> Vec<SentReply> {
            self.replies.lock().await.clone()
        }

        pub async fn deleted(&self) -> Vec<String> {
            self.deleted.lock().await.clone()
        }
    }

    #[async_trait]
    impl Responder for RecordingResponder {
        async fn reply(&self, event: &IncomingEvent, content: &ReplyContent) -> Result<(), ApiError> {
            if self.fail_replies {
                return Err(ApiError::Upstream { status: 503, message: "unavailable".to_owned() });
            }
            self.replies.lock().await.push(SentReply {
                sender_id: event.sender_id.clone(),
                room_id: event.room_id.clone(),
                content: content.clone(),
            });
            Ok(())
        }

        async fn delete_prompt(&self, event: &IncomingEvent) -> Result<(), ApiError> {
            if self.fail_deletes {
                return Err(ApiError::Upstream { status: 404, message: "gone".to_owned() });
            }
            if let Some(message_id) = &event.prompt_message_id {
                self.deleted.lock().await.push(message_id.clone());
            }
            Ok(())
        }
    }
}
