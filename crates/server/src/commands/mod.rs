//! Commands the relay bot answers to.

mod echo;
mod feedback;
mod greeting;
mod help;
mod messaging;
mod provisioning;

use std::sync::Arc;

use relay_core::ApplicationError;
use relay_webex::authz::AuthorizationGate;
use relay_webex::commands::{Command, CommandRegistry, CommandReply, HelpEntry, RegistryError};
use relay_webex::devices::DevicesApi;
use relay_webex::messages::MessagesApi;
use relay_webex::people::PeopleApi;
use relay_webex::rooms::{MembershipsApi, RoomsApi};

pub use echo::{EchoCallback, EchoCommand};
pub use feedback::{FeedbackCommand, FeedbackSubmit};
pub use greeting::GreetingCommand;
pub use help::HelpCommand;
pub use messaging::{MessageOrganization, MessageUser, OrganizationCallback, UserCallback};
pub use provisioning::{ProvisionCallback, ProvisionCommand, RoomCommand};

pub const HELP: &str = "help";
pub const ECHO: &str = "echo";
pub const ECHO_CALLBACK: &str = "echo_callback";
pub const GREETING: &str = "message";
pub const MESSAGE_USER: &str = "message_user";
pub const USER_CALLBACK: &str = "user_callback";
pub const MESSAGE_ORGANIZATION: &str = "message_organization";
pub const ORGANIZATION_CALLBACK: &str = "organization_callback";
pub const FEEDBACK: &str = "feedback";
pub const FEEDBACK_SUBMIT: &str = "feedback_submit";
pub const PROVISION: &str = "provision";
pub const PROVISION_CALLBACK: &str = "provision_callback";
pub const ROOM: &str = "room";

/// What the commands need from the platform.
#[derive(Clone)]
pub struct CommandDeps {
    /// Sends as the bot.
    pub messages: MessagesApi,
    /// Lists the organization; may run on the administrator credential.
    pub directory: PeopleApi,
    pub gate: Arc<AuthorizationGate>,
    /// Registers phones; runs on the administrator credential.
    pub devices: DevicesApi,
    pub rooms: RoomsApi,
    pub memberships: MembershipsApi,
    /// Where feedback goes when the request does not name a requester.
    pub feedback_recipient: Option<String>,
    /// Completes bare user ids typed into the direct-message card.
    pub default_domain: Option<String>,
    pub fanout_concurrency: usize,
}

pub fn build_registry(deps: &CommandDeps) -> Result<CommandRegistry, RegistryError> {
    let mut registry = CommandRegistry::new();

    registry.register(
        Command::keyword(ECHO, Arc::new(EchoCommand))
            .help("Repeat a message back. Without text, opens a card to type it in.")
            .chain(
                Command::callback(ECHO_CALLBACK, Arc::new(EchoCallback)).deleting_prior_message(),
            ),
    )?;

    registry.register(
        Command::keyword(GREETING, Arc::new(GreetingCommand::new(deps.messages.clone())))
            .help("Receive a greeting as a direct message."),
    )?;

    registry.register(
        Command::keyword(MESSAGE_USER, Arc::new(MessageUser::new(deps.gate.clone())))
            .help("Send a direct message to one person (administrators only).")
            .chain(
                Command::callback(
                    USER_CALLBACK,
                    Arc::new(UserCallback::new(
                        deps.gate.clone(),
                        deps.messages.clone(),
                        deps.default_domain.clone(),
                    )),
                )
                .deleting_prior_message(),
            ),
    )?;

    registry.register(
        Command::keyword(MESSAGE_ORGANIZATION, Arc::new(MessageOrganization::new(deps.gate.clone())))
            .help("Send a message to everyone in the organization (administrators only).")
            .chain(
                Command::callback(
                    ORGANIZATION_CALLBACK,
                    Arc::new(OrganizationCallback::new(
                        deps.gate.clone(),
                        deps.messages.clone(),
                        deps.directory.clone(),
                        deps.fanout_concurrency,
                    )),
                )
                .deleting_prior_message(),
            ),
    )?;

    registry.register(
        Command::keyword(
            FEEDBACK,
            Arc::new(FeedbackCommand::new(
                deps.gate.clone(),
                deps.messages.clone(),
                deps.directory.clone(),
                deps.fanout_concurrency,
            )),
        )
        .help("Ask everyone in the organization for feedback (administrators only).")
        .chain(
            Command::callback(
                FEEDBACK_SUBMIT,
                Arc::new(FeedbackSubmit::new(
                    deps.messages.clone(),
                    deps.directory.clone(),
                    deps.feedback_recipient.clone(),
                )),
            )
            .deleting_prior_message(),
        ),
    )?;

    registry.register(
        Command::keyword(PROVISION, Arc::new(ProvisionCommand))
            .help("Register a new IP phone to yourself.")
            .chain(
                Command::callback(
                    PROVISION_CALLBACK,
                    Arc::new(ProvisionCallback::new(deps.devices.clone())),
                )
                .deleting_prior_message(),
            ),
    )?;

    registry.register(
        Command::keyword(
            ROOM,
            Arc::new(RoomCommand::new(deps.rooms.clone(), deps.memberships.clone())),
        )
        .help("Create a group room with the given title and join it."),
    )?;

    let mut entries = vec![HelpEntry {
        keyword: HELP.to_owned(),
        help_text: "List the commands this bot understands.".to_owned(),
    }];
    entries.extend(registry.help_entries());
    registry.register(
        Command::keyword(HELP, Arc::new(HelpCommand::new(entries)))
            .help("List the commands this bot understands."),
    )?;

    Ok(registry)
}

pub(crate) fn denied(action: &str) -> CommandReply {
    CommandReply::from_error(&ApplicationError::unauthorized(action))
}
