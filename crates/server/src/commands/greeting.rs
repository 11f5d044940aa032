use async_trait::async_trait;
use relay_core::ApplicationError;
use relay_webex::commands::{CommandHandler, CommandReply, Invocation};
use relay_webex::messages::{MessagesApi, Recipient};
use relay_webex::responder::ReplyContent;
use tracing::warn;

/// Sends the sender a direct greeting.
pub struct GreetingCommand {
    messages: MessagesApi,
}

impl GreetingCommand {
    pub fn new(messages: MessagesApi) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl CommandHandler for GreetingCommand {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        let recipient = Recipient::PersonId(invocation.event.sender_id.clone());
        match self.messages.send(&recipient, &ReplyContent::text("Hello!")).await {
            Ok(_) => CommandReply::completed(ReplyContent::info("I sent you a direct message.")),
            Err(error) => {
                warn!(
                    event_name = "server.commands.greeting_failed",
                    correlation_id = %invocation.event.event_id,
                    sender_id = %invocation.event.sender_id,
                    error = %error,
                    "direct greeting failed"
                );
                CommandReply::from_error(&ApplicationError::from(error))
            }
        }
    }
}
