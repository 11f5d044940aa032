use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::ApplicationError;
use serde_json::Value;
use thiserror::Error;

use crate::events::IncomingEvent;
use crate::responder::ReplyContent;

/// How a command is reached: a typed keyword, or a card submission's callback keyword.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    Keyword(String),
    Callback(String),
}

impl Trigger {
    pub fn key(&self) -> &str {
        match self {
            Self::Keyword(key) | Self::Callback(key) => key,
        }
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, Self::Callback(_))
    }
}

/// What a handler sees for one invocation.
pub struct Invocation<'a> {
    pub event: &'a IncomingEvent,
    /// Text after the keyword for typed commands, empty for card submissions.
    pub arguments: &'a str,
    /// Value stored by the command that opened the chain being resumed.
    pub carry_over: Option<&'a Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    /// The command did its work; its chained commands become pending.
    Completed,
    /// The command did its work and needs no follow-up.
    Finished,
    /// The command refused or failed; any pending chain is dropped.
    Declined,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommandReply {
    pub content: Option<ReplyContent>,
    pub status: ReplyStatus,
    pub carry_over: Option<Value>,
    /// Other senders who may answer this command's chained callbacks.
    pub delegated_chains: Vec<String>,
}

impl CommandReply {
    pub fn completed(content: ReplyContent) -> Self {
        Self {
            content: Some(content),
            status: ReplyStatus::Completed,
            carry_over: None,
            delegated_chains: Vec::new(),
        }
    }

    pub fn finished(content: ReplyContent) -> Self {
        Self {
            content: Some(content),
            status: ReplyStatus::Finished,
            carry_over: None,
            delegated_chains: Vec::new(),
        }
    }

    pub fn declined(content: ReplyContent) -> Self {
        Self {
            content: Some(content),
            status: ReplyStatus::Declined,
            carry_over: None,
            delegated_chains: Vec::new(),
        }
    }

    pub fn silent() -> Self {
        Self {
            content: None,
            status: ReplyStatus::Completed,
            carry_over: None,
            delegated_chains: Vec::new(),
        }
    }

    pub fn from_error(error: &ApplicationError) -> Self {
        Self::declined(ReplyContent::warning(error.user_message()))
    }

    pub fn with_carry_over(mut self, carry_over: Value) -> Self {
        self.carry_over = Some(carry_over);
        self
    }

    pub fn delegate_chain_to<I>(mut self, person_ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.delegated_chains.extend(person_ids);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == ReplyStatus::Completed
    }

    pub fn is_declined(&self) -> bool {
        self.status == ReplyStatus::Declined
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply;
}

pub struct Command {
    trigger: Trigger,
    help_text: String,
    deletes_prior_message: bool,
    chained: Vec<Arc<Command>>,
    handler: Arc<dyn CommandHandler>,
}

impl Command {
    pub fn keyword(keyword: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self::new(Trigger::Keyword(keyword.into().trim().to_lowercase()), handler)
    }

    pub fn callback(callback_keyword: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self::new(Trigger::Callback(callback_keyword.into().trim().to_lowercase()), handler)
    }

    fn new(trigger: Trigger, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            trigger,
            help_text: String::new(),
            deletes_prior_message: false,
            chained: Vec::new(),
            handler,
        }
    }

    pub fn help(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = help_text.into();
        self
    }

    /// Delete the card the sender answered once this command runs.
    pub fn deleting_prior_message(mut self) -> Self {
        self.deletes_prior_message = true;
        self
    }

    pub fn chain(mut self, command: Command) -> Self {
        self.chained.push(Arc::new(command));
        self
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn help_text(&self) -> &str {
        &self.help_text
    }

    pub fn deletes_prior_message(&self) -> bool {
        self.deletes_prior_message
    }

    pub fn chained_commands(&self) -> &[Arc<Command>] {
        &self.chained
    }

    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Command")
            .field("trigger", &self.trigger)
            .field("deletes_prior_message", &self.deletes_prior_message)
            .field(
                "chained",
                &self.chained.iter().map(|command| command.trigger.key()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("trigger `{0}` is already registered")]
    Conflict(String),
    #[error("command triggers must not be empty")]
    EmptyTrigger,
    #[error("chained command `{0}` must use a callback keyword")]
    ChainedKeyword(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpEntry {
    pub keyword: String,
    pub help_text: String,
}

/// Immutable once built: the dispatcher only ever reads it.
#[derive(Default)]
pub struct CommandRegistry {
    keywords: HashMap<String, Arc<Command>>,
    callbacks: HashMap<String, Arc<Command>>,
    top_level: Vec<Arc<Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `command` and every command chained beneath it. Either the
    /// whole tree is added or, on error, nothing is.
    pub fn register(&mut self, command: Command) -> Result<Arc<Command>, RegistryError> {
        let root = Arc::new(command);
        let mut tree = Vec::new();
        collect_tree(&root, &mut tree);

        let mut claimed = HashSet::new();
        for (depth, command) in &tree {
            let key = command.trigger.key();
            if key.is_empty() {
                return Err(RegistryError::EmptyTrigger);
            }
            if *depth > 0 && !command.trigger.is_callback() {
                return Err(RegistryError::ChainedKeyword(key.to_owned()));
            }
            if self.keywords.contains_key(key)
                || self.callbacks.contains_key(key)
                || !claimed.insert(key.to_owned())
            {
                return Err(RegistryError::Conflict(key.to_owned()));
            }
        }

        for (_, command) in tree {
            let key = command.trigger.key().to_owned();
            if command.trigger.is_callback() {
                self.callbacks.insert(key, command);
            } else {
                self.keywords.insert(key, command);
            }
        }
        self.top_level.push(root.clone());
        Ok(root)
    }

    pub fn lookup_keyword(&self, keyword: &str) -> Option<Arc<Command>> {
        self.keywords.get(&keyword.trim().to_lowercase()).cloned()
    }

    pub fn lookup_callback(&self, callback_keyword: &str) -> Option<Arc<Command>> {
        self.callbacks.get(&callback_keyword.trim().to_lowercase()).cloned()
    }

    /// Typed commands in registration order.
    pub fn help_entries(&self) -> Vec<HelpEntry> {
        self.top_level
            .iter()
            .filter_map(|command| match &command.trigger {
                Trigger::Keyword(keyword) => Some(HelpEntry {
                    keyword: keyword.clone(),
                    help_text: command.help_text.clone(),
                }),
                Trigger::Callback(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keywords.len() + self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect_tree(root: &Arc<Command>, tree: &mut Vec<(usize, Arc<Command>)>) {
    let mut stack = vec![(0_usize, root.clone())];
    while let Some((depth, command)) = stack.pop() {
        for chained in command.chained.iter().rev() {
            stack.push((depth + 1, chained.clone()));
        }
        tree.push((depth, command));
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingHandler;
    use super::{Command, CommandRegistry, RegistryError, Trigger};

    #[test]
    fn registers_keyword_with_chained_callbacks() {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                Command::keyword("Feedback", RecordingHandler::text("card"))
                    .help("Collect feedback")
                    .chain(Command::callback("feedback_submit", RecordingHandler::text("thanks"))),
            )
            .expect("register");

        let command = registry.lookup_keyword("FEEDBACK").expect("keyword");
        assert_eq!(command.trigger(), &Trigger::Keyword("feedback".to_owned()));
        assert_eq!(command.chained_commands().len(), 1);
        assert!(registry.lookup_callback("feedback_submit").is_some());
        assert!(registry.lookup_keyword("feedback_submit").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn keyword_colliding_with_callback_is_rejected() {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                Command::keyword("feedback", RecordingHandler::text("card"))
                    .chain(Command::callback("submit", RecordingHandler::text("ok"))),
            )
            .expect("register");

        let error = registry
            .register(Command::keyword("submit", RecordingHandler::text("dup")))
            .expect_err("collision");

        assert_eq!(error, RegistryError::Conflict("submit".to_owned()));
    }

    #[test]
    fn failed_registration_adds_nothing() {
        let mut registry = CommandRegistry::new();
        registry.register(Command::keyword("echo", RecordingHandler::text("echo"))).expect("echo");

        let error = registry
            .register(
                Command::keyword("greet", RecordingHandler::text("hi"))
                    .chain(Command::callback("echo", RecordingHandler::text("dup"))),
            )
            .expect_err("nested collision");

        assert_eq!(error, RegistryError::Conflict("echo".to_owned()));
        assert!(registry.lookup_keyword("greet").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_within_one_tree_is_rejected() {
        let mut registry = CommandRegistry::new();

        let error = registry
            .register(
                Command::keyword("ask", RecordingHandler::text("q"))
                    .chain(Command::callback("answer", RecordingHandler::text("a")))
                    .chain(Command::callback("Answer", RecordingHandler::text("b"))),
            )
            .expect_err("duplicate callback");

        assert_eq!(error, RegistryError::Conflict("answer".to_owned()));
        assert!(registry.is_empty());
    }

    #[test]
    fn chained_commands_must_be_callbacks() {
        let mut registry = CommandRegistry::new();

        let error = registry
            .register(
                Command::keyword("ask", RecordingHandler::text("q"))
                    .chain(Command::keyword("answer", RecordingHandler::text("a"))),
            )
            .expect_err("keyword in chain");

        assert_eq!(error, RegistryError::ChainedKeyword("answer".to_owned()));
    }

    #[test]
    fn empty_trigger_is_rejected() {
        let mut registry = CommandRegistry::new();

        let error = registry
            .register(Command::keyword("   ", RecordingHandler::text("q")))
            .expect_err("empty");

        assert_eq!(error, RegistryError::EmptyTrigger);
    }

    #[test]
    fn help_lists_typed_commands_in_registration_order() {
        let mut registry = CommandRegistry::new();
        registry
            .register(Command::keyword("help", RecordingHandler::text("h")).help("Show help"))
            .expect("help");
        registry
            .register(
                Command::keyword("feedback", RecordingHandler::text("f"))
                    .help("Collect feedback")
                    .chain(Command::callback("feedback_submit", RecordingHandler::text("s"))),
            )
            .expect("feedback");

        let keywords: Vec<String> =
            registry.help_entries().into_iter().map(|entry| entry.keyword).collect();
        assert_eq!(keywords, vec!["help", "feedback"]);
    }
}
