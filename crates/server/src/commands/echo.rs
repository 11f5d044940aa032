use async_trait::async_trait;
use relay_webex::cards::{CardBuilder, CardMessage, TextInput};
use relay_webex::commands::{CommandHandler, CommandReply, Invocation};
use relay_webex::responder::ReplyContent;

use super::ECHO_CALLBACK;

const MESSAGE_INPUT: &str = "message";

/// `echo <text>` answers at once; bare `echo` opens a card.
pub struct EchoCommand;

#[async_trait]
impl CommandHandler for EchoCommand {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        if invocation.arguments.is_empty() {
            return CommandReply::completed(ReplyContent::card(echo_card()));
        }
        CommandReply::finished(ReplyContent::text(invocation.arguments))
    }
}

pub struct EchoCallback;

#[async_trait]
impl CommandHandler for EchoCallback {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        match invocation.event.input(MESSAGE_INPUT).map(str::trim) {
            Some(text) if !text.is_empty() => CommandReply::completed(ReplyContent::text(text)),
            _ => CommandReply::declined(ReplyContent::warning("There was nothing to echo.")),
        }
    }
}

fn echo_card() -> CardMessage {
    CardBuilder::new("Type something and I will echo it back.")
        .heading("Echo")
        .inputs(|inputs| {
            inputs.text(
                TextInput::new(MESSAGE_INPUT, "Message")
                    .placeholder("What should I say?")
                    .required("Please type a message."),
            );
        })
        .submit("Echo", ECHO_CALLBACK, |_| {})
        .build()
}
