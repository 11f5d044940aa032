use std::sync::Arc;

use async_trait::async_trait;
use relay_core::ApplicationError;
use relay_webex::authz::AuthorizationGate;
use relay_webex::cards::{CardBuilder, CardMessage, TextInput};
use relay_webex::commands::{CommandHandler, CommandReply, Invocation};
use relay_webex::fanout::fan_out;
use relay_webex::messages::{MessagesApi, Recipient};
use relay_webex::people::PeopleApi;
use relay_webex::responder::ReplyContent;
use tracing::{info, warn};

use super::{denied, ORGANIZATION_CALLBACK, USER_CALLBACK};

const USER_INPUT: &str = "user";
const MESSAGE_INPUT: &str = "message";

pub struct MessageUser {
    gate: Arc<AuthorizationGate>,
}

impl MessageUser {
    pub fn new(gate: Arc<AuthorizationGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl CommandHandler for MessageUser {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        if !self.gate.is_admin(&invocation.event.sender_id).await {
            return denied("send direct messages");
        }
        CommandReply::completed(ReplyContent::card(user_card()))
    }
}

pub struct UserCallback {
    gate: Arc<AuthorizationGate>,
    messages: MessagesApi,
    default_domain: Option<String>,
}

impl UserCallback {
    pub fn new(
        gate: Arc<AuthorizationGate>,
        messages: MessagesApi,
        default_domain: Option<String>,
    ) -> Self {
        Self { gate, messages, default_domain }
    }

    fn target_address(&self, user: &str) -> Result<String, ApplicationError> {
        let user = user.trim();
        if user.is_empty() {
            return Err(ApplicationError::InvalidInput("a recipient is required".to_owned()));
        }
        if user.contains('@') {
            return Ok(user.to_lowercase());
        }
        match &self.default_domain {
            Some(domain) => Ok(format!("{}@{domain}", user.to_lowercase())),
            None => Err(ApplicationError::InvalidInput(format!(
                "`{user}` is not an email address and no default domain is configured"
            ))),
        }
    }
}

#[async_trait]
impl CommandHandler for UserCallback {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        let event = invocation.event;
        if !self.gate.is_admin(&event.sender_id).await {
            return denied("send direct messages");
        }
        let address = match self.target_address(event.input(USER_INPUT).unwrap_or_default()) {
            Ok(address) => address,
            Err(error) => return CommandReply::from_error(&error),
        };
        let Some(text) = event.input(MESSAGE_INPUT).map(str::trim).filter(|text| !text.is_empty())
        else {
            return CommandReply::from_error(&ApplicationError::InvalidInput(
                "the message is empty".to_owned(),
            ));
        };

        match self.messages.send(&Recipient::PersonEmail(address.clone()), &ReplyContent::text(text)).await {
            Ok(_) => {
                info!(
                    event_name = "server.commands.direct_message_sent",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    "direct message delivered"
                );
                CommandReply::finished(ReplyContent::info(format!("Message sent to {address}.")))
            }
            Err(error) => {
                warn!(
                    event_name = "server.commands.direct_message_failed",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    error = %error,
                    "direct message failed"
                );
                CommandReply::from_error(&ApplicationError::from(error))
            }
        }
    }
}

pub struct MessageOrganization {
    gate: Arc<AuthorizationGate>,
}

impl MessageOrganization {
    pub fn new(gate: Arc<AuthorizationGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl CommandHandler for MessageOrganization {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        if !self.gate.is_admin(&invocation.event.sender_id).await {
            return denied("message the organization");
        }
        CommandReply::completed(ReplyContent::card(organization_card()))
    }
}

pub struct OrganizationCallback {
    gate: Arc<AuthorizationGate>,
    messages: MessagesApi,
    directory: PeopleApi,
    concurrency: usize,
}

impl OrganizationCallback {
    pub fn new(
        gate: Arc<AuthorizationGate>,
        messages: MessagesApi,
        directory: PeopleApi,
        concurrency: usize,
    ) -> Self {
        Self { gate, messages, directory, concurrency }
    }
}

#[async_trait]
impl CommandHandler for OrganizationCallback {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        if !self.gate.is_admin(&invocation.event.sender_id).await {
            return denied("message the organization");
        }
        let Some(text) =
            invocation.event.input(MESSAGE_INPUT).map(str::trim).filter(|text| !text.is_empty())
        else {
            return CommandReply::from_error(&ApplicationError::InvalidInput(
                "the message is empty".to_owned(),
            ));
        };
        let content = ReplyContent::text(text);

        let result = fan_out(self.directory.list_all(), self.concurrency, |person| {
            let messages = self.messages.clone();
            let content = content.clone();
            async move {
                let email = person.primary_email().unwrap_or_default().to_owned();
                messages.send(&Recipient::PersonEmail(email), &content).await.map(|_| ())
            }
        })
        .await;

        match result {
            Ok(report) => CommandReply::finished(ReplyContent::info(format!(
                "Message sent to {} people in the organization.",
                report.successes
            ))),
            Err(error) => {
                let failure = ApplicationError::from(error);
                warn!(
                    event_name = "server.commands.organization_message_incomplete",
                    correlation_id = %invocation.event.event_id,
                    sender_id = %invocation.event.sender_id,
                    error_class = failure.class(),
                    error = %failure,
                    "organization message did not reach everyone"
                );
                CommandReply::from_error(&failure)
            }
        }
    }
}

fn user_card() -> CardMessage {
    CardBuilder::new("Send a direct message to one person.")
        .heading("Message a user")
        .inputs(|inputs| {
            inputs
                .text(
                    TextInput::new(USER_INPUT, "Recipient")
                        .placeholder("user id or email address")
                        .required("A recipient is required."),
                )
                .text(
                    TextInput::new(MESSAGE_INPUT, "Message")
                        .multiline()
                        .required("A message is required."),
                );
        })
        .submit("Send", USER_CALLBACK, |_| {})
        .build()
}

fn organization_card() -> CardMessage {
    CardBuilder::new("Send a message to everyone in the organization.")
        .heading("Message the organization")
        .text("Everyone in the organization will receive this as a direct message.")
        .inputs(|inputs| {
            inputs.text(
                TextInput::new(MESSAGE_INPUT, "Message")
                    .multiline()
                    .required("A message is required."),
            );
        })
        .submit("Send to everyone", ORGANIZATION_CALLBACK, |_| {})
        .build()
}

#[cfg(test)]
mod tests {
    use super::{organization_card, user_card};

    #[test]
    fn cards_route_to_their_callbacks() {
        assert_eq!(user_card().card.callback_keywords(), vec!["user_callback"]);
        assert_eq!(organization_card().card.callback_keywords(), vec!["organization_callback"]);
    }
}
