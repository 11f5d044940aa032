use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::authz::{email_in_domains, AuthorizationGate};
use crate::cards::CALLBACK_KEYWORD_FIELD;
use crate::commands::{Command, CommandRegistry, Invocation, ReplyStatus};
use crate::conversation::ConversationStore;
use crate::responder::Responder;

#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    Text { text: String },
    CardSubmission { callback_keyword: Option<String>, inputs: HashMap<String, String> },
}

/// One inbound occurrence, already hydrated from the platform.
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingEvent {
    pub event_id: String,
    pub sender_id: String,
    pub sender_email: Option<String>,
    pub room_id: String,
    pub kind: EventKind,
    /// For card submissions, the message that carried the card.
    pub prompt_message_id: Option<String>,
    pub raw: Value,
}

impl IncomingEvent {
    pub fn text(
        event_id: impl Into<String>,
        sender_id: impl Into<String>,
        room_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            sender_id: sender_id.into(),
            sender_email: None,
            room_id: room_id.into(),
            kind: EventKind::Text { text: text.into() },
            prompt_message_id: None,
            raw: Value::Null,
        }
    }

    /// The callback keyword is taken out of `inputs`; everything else stays.
    pub fn card_submission(
        event_id: impl Into<String>,
        sender_id: impl Into<String>,
        room_id: impl Into<String>,
        prompt_message_id: Option<String>,
        mut inputs: HashMap<String, String>,
    ) -> Self {
        let callback_keyword = inputs.remove(CALLBACK_KEYWORD_FIELD);
        Self {
            event_id: event_id.into(),
            sender_id: sender_id.into(),
            sender_email: None,
            room_id: room_id.into(),
            kind: EventKind::CardSubmission { callback_keyword, inputs },
            prompt_message_id,
            raw: Value::Null,
        }
    }

    pub fn with_sender_email(mut self, email: impl Into<String>) -> Self {
        self.sender_email = Some(email.into());
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn input(&self, name: &str) -> Option<&str> {
        match &self.kind {
            EventKind::CardSubmission { inputs, .. } => inputs.get(name).map(String::as_str),
            EventKind::Text { .. } => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            EventKind::Text { .. } => "text",
            EventKind::CardSubmission { .. } => "card_submission",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed { trigger: String, reply_sent: bool },
    NoHandler,
    NoSuchChain { callback_keyword: String },
    SenderNotApproved,
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Executed { .. } => "executed",
            Self::NoHandler => "no_handler",
            Self::NoSuchChain { .. } => "no_such_chain",
            Self::SenderNotApproved => "sender_not_approved",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DispatcherSettings {
    /// Leading mention stripped from typed text before keyword matching.
    pub bot_name: Option<String>,
    /// Sender domains allowed to use the bot. Empty allows everyone.
    pub approved_domains: Vec<String>,
}

/// Routes events to commands and keeps per-sender chains in step.
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    conversations: Arc<ConversationStore>,
    responder: Arc<dyn Responder>,
    gate: Option<Arc<AuthorizationGate>>,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        conversations: Arc<ConversationStore>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self { registry, conversations, responder, gate: None, settings: DispatcherSettings::default() }
    }

    pub fn with_gate(mut self, gate: Arc<AuthorizationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_settings(mut self, settings: DispatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    pub async fn dispatch(&self, event: &IncomingEvent) -> DispatchOutcome {
        if !self.sender_approved(event).await {
            info!(
                event_name = "webex.dispatch.sender_not_approved",
                correlation_id = %event.event_id,
                sender_id = %event.sender_id,
                "ignoring sender outside approved domains"
            );
            return DispatchOutcome::SenderNotApproved;
        }

        match &event.kind {
            EventKind::Text { text } => {
                let Some((keyword, arguments)) = split_command(text, self.settings.bot_name.as_deref())
                else {
                    return DispatchOutcome::NoHandler;
                };
                let Some(command) = self.registry.lookup_keyword(&keyword) else {
                    debug!(
                        event_name = "webex.dispatch.no_handler",
                        correlation_id = %event.event_id,
                        keyword = %keyword,
                        "no command for keyword"
                    );
                    return DispatchOutcome::NoHandler;
                };
                self.execute(event, command, arguments, None).await
            }
            EventKind::CardSubmission { callback_keyword: Some(callback_keyword), .. } => {
                if self.registry.lookup_callback(callback_keyword).is_none() {
                    return DispatchOutcome::NoHandler;
                }
                match self.conversations.resolve(&event.sender_id, callback_keyword) {
                    Ok(resumed) => {
                        self.execute(event, resumed.command, "", resumed.carry_over).await
                    }
                    Err(_) => {
                        info!(
                            event_name = "webex.dispatch.no_such_chain",
                            correlation_id = %event.event_id,
                            sender_id = %event.sender_id,
                            callback_keyword = %callback_keyword,
                            "card submission does not continue a pending chain"
                        );
                        DispatchOutcome::NoSuchChain { callback_keyword: callback_keyword.clone() }
                    }
                }
            }
            EventKind::CardSubmission { callback_keyword: None, .. } => DispatchOutcome::NoHandler,
        }
    }

    async fn execute(
        &self,
        event: &IncomingEvent,
        command: Arc<Command>,
        arguments: &str,
        carry_over: Option<Value>,
    ) -> DispatchOutcome {
        let trigger = command.trigger().key().to_owned();

        if command.deletes_prior_message() {
            if let Err(error) = self.responder.delete_prompt(event).await {
                warn!(
                    event_name = "webex.dispatch.prompt_delete_failed",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    trigger = %trigger,
                    error = %error,
                    "failed to delete prompt message"
                );
            }
        }

        let reply = command
            .handler()
            .execute(&Invocation { event, arguments, carry_over: carry_over.as_ref() })
            .await;

        let chained = command.chained_commands();
        if reply.status == ReplyStatus::Completed && !chained.is_empty() {
            self.conversations.open(&event.sender_id, chained.to_vec(), reply.carry_over.clone());
            for delegate in reply.delegated_chains.iter().filter(|id| **id != event.sender_id) {
                self.conversations.open(delegate, chained.to_vec(), reply.carry_over.clone());
            }
        } else {
            self.conversations.close(&event.sender_id);
        }

        let reply_sent = match &reply.content {
            Some(content) => match self.responder.reply(event, content).await {
                Ok(()) => true,
                Err(error) => {
                    warn!(
                        event_name = "webex.dispatch.reply_failed",
                        correlation_id = %event.event_id,
                        sender_id = %event.sender_id,
                        trigger = %trigger,
                        error = %error,
                        "failed to send reply"
                    );
                    false
                }
            },
            None => false,
        };

        info!(
            event_name = "webex.dispatch.executed",
            correlation_id = %event.event_id,
            sender_id = %event.sender_id,
            trigger = %trigger,
            status = ?reply.status,
            reply_sent,
            "command executed"
        );

        DispatchOutcome::Executed { trigger, reply_sent }
    }

    async fn sender_approved(&self, event: &IncomingEvent) -> bool {
        let domains = &self.settings.approved_domains;
        if domains.is_empty() {
            return true;
        }
        if let Some(email) = &event.sender_email {
            return email_in_domains(email, domains);
        }
        match &self.gate {
            Some(gate) => gate.in_approved_domain(&event.sender_id, domains).await,
            None => false,
        }
    }
}

/// Splits typed text into a lowercased keyword and the remaining arguments.
/// A leading bot mention and a leading `/` are ignored.
pub fn split_command<'a>(text: &'a str, bot_name: Option<&str>) -> Option<(String, &'a str)> {
    let mut rest = text.trim();
    if let Some(name) = bot_name.map(str::trim).filter(|name| !name.is_empty()) {
        if let Some(prefix) = rest.get(..name.len()) {
            let after = &rest[name.len()..];
            if prefix.eq_ignore_ascii_case(name)
                && (after.is_empty() || after.starts_with(char::is_whitespace))
            {
                rest = after.trim_start();
            }
        }
    }

    let (keyword, arguments) = match rest.split_once(char::is_whitespace) {
        Some((keyword, arguments)) => (keyword, arguments.trim()),
        None => (rest, ""),
    };
    let keyword = keyword.strip_prefix('/').unwrap_or(keyword);
    if keyword.is_empty() {
        return None;
    }
    Some((keyword.to_lowercase(), arguments))
}
