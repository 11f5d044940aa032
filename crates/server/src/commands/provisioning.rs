use async_trait::async_trait;
use relay_core::ApplicationError;
use relay_webex::cards::{CardBuilder, CardMessage, ChoiceInput, TextInput};
use relay_webex::commands::{CommandHandler, CommandReply, Invocation};
use relay_webex::devices::{DeviceError, DevicesApi, MacAddress};
use relay_webex::responder::ReplyContent;
use relay_webex::rooms::{MembershipsApi, RoomsApi};
use tracing::{info, warn};

use super::PROVISION_CALLBACK;

const MODEL_INPUT: &str = "model";
const MAC_INPUT: &str = "mac_address";
const PHONE_MODELS: [&str; 3] = ["DMS Cisco 8851", "DMS Cisco 8861", "DMS Cisco 8865"];

/// Opens the phone registration card.
pub struct ProvisionCommand;

#[async_trait]
impl CommandHandler for ProvisionCommand {
    async fn execute(&self, _invocation: &Invocation<'_>) -> CommandReply {
        CommandReply::completed(ReplyContent::card(provision_card()))
    }
}

/// Registers the submitted phone to whoever submitted the card.
pub struct ProvisionCallback {
    devices: DevicesApi,
}

impl ProvisionCallback {
    pub fn new(devices: DevicesApi) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl CommandHandler for ProvisionCallback {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        let event = invocation.event;
        let mac: MacAddress = match event.input(MAC_INPUT).unwrap_or_default().parse() {
            Ok(mac) => mac,
            Err(error) => {
                return CommandReply::from_error(&ApplicationError::InvalidInput(error.to_string()));
            }
        };
        let Some(model) = event.input(MODEL_INPUT).map(str::trim).filter(|model| !model.is_empty())
        else {
            return CommandReply::from_error(&ApplicationError::InvalidInput(
                "a phone model is required".to_owned(),
            ));
        };

        match self.devices.provision(&mac, model, &event.sender_id).await {
            Ok(device) => {
                info!(
                    event_name = "server.commands.device_provisioned",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    device_id = %device.id,
                    "phone registered"
                );
                CommandReply::finished(ReplyContent::info(format!("MAC address {mac} added successfully.")))
            }
            Err(error) => {
                if !matches!(error, DeviceError::Duplicate(_)) {
                    warn!(
                        event_name = "server.commands.device_provision_failed",
                        correlation_id = %event.event_id,
                        sender_id = %event.sender_id,
                        error = %error,
                        "phone registration failed"
                    );
                }
                CommandReply::from_error(&ApplicationError::from(error))
            }
        }
    }
}

/// `room <title>` creates a group room and adds the sender to it.
pub struct RoomCommand {
    rooms: RoomsApi,
    memberships: MembershipsApi,
}

impl RoomCommand {
    pub fn new(rooms: RoomsApi, memberships: MembershipsApi) -> Self {
        Self { rooms, memberships }
    }
}

#[async_trait]
impl CommandHandler for RoomCommand {
    async fn execute(&self, invocation: &Invocation<'_>) -> CommandReply {
        let event = invocation.event;
        let title = invocation.arguments.trim();
        if title.is_empty() {
            return CommandReply::from_error(&ApplicationError::InvalidInput(
                "a room title is required, as in `room Launch planning`".to_owned(),
            ));
        }

        let room = match self.rooms.create(title).await {
            Ok(room) => room,
            Err(error) => {
                warn!(
                    event_name = "server.commands.room_create_failed",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    error = %error,
                    "room creation failed"
                );
                return CommandReply::from_error(&ApplicationError::from(error));
            }
        };

        match self.memberships.add(&room.id, &event.sender_id).await {
            Ok(_) => {
                info!(
                    event_name = "server.commands.room_created",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    room_id = %room.id,
                    "room created and sender added"
                );
                CommandReply::finished(ReplyContent::info(format!(
                    "Created **{}** and added you to it.",
                    room.title
                )))
            }
            Err(error) => {
                warn!(
                    event_name = "server.commands.room_membership_failed",
                    correlation_id = %event.event_id,
                    sender_id = %event.sender_id,
                    room_id = %room.id,
                    error = %error,
                    "sender could not be added to the new room"
                );
                CommandReply::from_error(&ApplicationError::from(error))
            }
        }
    }
}

fn provision_card() -> CardMessage {
    CardBuilder::new("Register your new IP phone.")
        .heading("Phone provisioning")
        .text("Choose the model and enter the MAC address of your new phone.")
        .inputs(|inputs| {
            inputs
                .choice(
                    ChoiceInput::new(MODEL_INPUT, "Model")
                        .choices(PHONE_MODELS)
                        .placeholder("Phone model")
                        .required("A model is required."),
                )
                .text(
                    TextInput::new(MAC_INPUT, "MAC address")
                        .placeholder("A1B2C3D4E5F6")
                        .required("A MAC address is required."),
                );
        })
        .submit("Submit", PROVISION_CALLBACK, |_| {})
        .build()
}

#[cfg(test)]
mod tests {
    use super::provision_card;

    #[test]
    fn card_offers_models_and_routes_to_callback() {
        let card = provision_card();

        assert_eq!(card.card.callback_keywords(), vec!["provision_callback"]);
        let content = card.card.to_value();
        assert_eq!(content["body"][2]["choices"].as_array().map(Vec::len), Some(3));
        assert_eq!(content["body"][3]["id"], "mac_address");
    }
}
