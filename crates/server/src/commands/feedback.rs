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
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{denied, FEEDBACK_SUBMIT};

const FEEDBACK_INPUT: &str = "feedback";
const REQUESTED_BY: &str = "requested_by";

/// Sends a feedback card to everyone in the organization. Each person reached
/// may answer once through `feedback_submit`.
pub struct FeedbackCommand {
    gate: Arc<AuthorizationGate>,
    messages: MessagesApi,
    directory: PeopleApi,
    concurrency: usize,
}

impl FeedbackCommand {
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
impl CommandHandler for FeedbackCommand {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        let event = invocation.event;
        if !self.gate.is_admin(&event.sender_id).await {
            return denied("request feedback");
        }

        let requester = match &event.sender_email {
            Some(email) => Some(email.clone()),
            None => match self.directory.get(&event.sender_id).await {
                Ok(person) => person.primary_email().map(str::to_owned),
                Err(error) => {
                    info!(
                        event_name = "server.commands.feedback_requester_unresolved",
                        correlation_id = %event.event_id,
                        sender_id = %event.sender_id,
                        error = %error,
                        "requester lookup failed, answers go to the fallback recipient"
                    );
                    None
                }
            },
        };
        let card = ReplyContent::card(feedback_card());

        let result = fan_out(self.directory.list_all(), self.concurrency, |person| {
            let messages = self.messages.clone();
            let card = card.clone();
            async move {
                messages.send(&Recipient::PersonId(person.id.clone()), &card).await.map(|_| ())
            }
        })
        .await;

        let (delivered, summary) = match result {
            Ok(report) => {
                let summary = ReplyContent::info(format!(
                    "Feedback request sent to {} people.",
                    report.successes
                ));
                (report.delivered, summary)
            }
            Err(error) if error.delivered().is_empty() => {
                return CommandReply::from_error(&ApplicationError::from(error));
            }
            Err(error) => {
                // Whoever already holds a card must still be able to answer it.
                let delivered = error.delivered().to_vec();
                let failure = ApplicationError::from(error);
                warn!(
                    event_name = "server.commands.feedback_incomplete",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    error_class = failure.class(),
                    recipients = delivered.len(),
                    error = %failure,
                    "feedback request did not reach everyone"
                );
                (delivered, ReplyContent::warning(failure.user_message()))
            }
        };

        info!(
            event_name = "server.commands.feedback_requested",
            correlation_id = %event.event_id,
            sender_id = %event.sender_id,
            recipients = delivered.len(),
            "feedback request fanned out"
        );

        CommandReply::completed(summary)
            .with_carry_over(json!({ "requested_by": requester }))
            .delegate_chain_to(delivered)
    }
}

/// Forwards one person's feedback to whoever asked for it.
pub struct FeedbackSubmit {
    messages: MessagesApi,
    directory: PeopleApi,
    fallback_recipient: Option<String>,
}

impl FeedbackSubmit {
    pub fn new(messages: MessagesApi, directory: PeopleApi, fallback_recipient: Option<String>) -> Self {
        Self { messages, directory, fallback_recipient }
    }

    fn recipient(&self, carry_over: Option<&Value>) -> Option<String> {
        carry_over
            .and_then(|value| value.get(REQUESTED_BY))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| self.fallback_recipient.clone())
    }
}

#[async_trait]
impl CommandHandler for FeedbackSubmit {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        let event = invocation.event;
        let Some(feedback) =
            event.input(FEEDBACK_INPUT).map(str::trim).filter(|text| !text.is_empty())
        else {
            return CommandReply::from_error(&ApplicationError::InvalidInput(
                "the feedback is empty".to_owned(),
            ));
        };
        let Some(recipient) = self.recipient(invocation.carry_over) else {
            return CommandReply::from_error(&ApplicationError::Configuration(
                "no feedback recipient".to_owned(),
            ));
        };

        let author = match self.directory.get(&event.sender_id).await {
            Ok(person) => person.primary_email().map(str::to_owned).unwrap_or(person.display_name),
            Err(error) => {
                info!(
                    event_name = "server.commands.feedback_author_unresolved",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    error = %error,
                    "author lookup failed, forwarding under the sender id"
                );
                event.sender_id.clone()
            }
        };
        let forwarded = ReplyContent::info(format!("Feedback from {author}:\n\n{feedback}"));

        match self.messages.send(&Recipient::PersonEmail(recipient), &forwarded).await {
            Ok(_) => CommandReply::finished(ReplyContent::info("Thank you for your feedback!")),
            Err(error) => {
                warn!(
                    event_name = "server.commands.feedback_forward_failed",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    error = %error,
                    "feedback could not be forwarded"
                );
                CommandReply::from_error(&ApplicationError::from(error))
            }
        }
    }
}

fn feedback_card() -> CardMessage {
    CardBuilder::new("We would like your feedback.")
        .heading("Feedback")
        .text("Tell us what is working and what is not. Your answer goes to the person who asked.")
        .inputs(|inputs| {
            inputs.text(
                TextInput::new(FEEDBACK_INPUT, "Your feedback")
                    .multiline()
                    .required("Please write some feedback."),
            );
        })
        .submit("Submit", FEEDBACK_SUBMIT, |_| {})
        .build()
}

#[cfg(test)]
mod tests {
    use super::feedback_card;

    #[test]
    fn card_routes_to_feedback_submit() {
        assert_eq!(feedback_card().card.callback_keywords(), vec!["feedback_submit"]);
    }
}
