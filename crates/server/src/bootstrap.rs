use std::sync::Arc;
use std::time::Duration;

use relay_core::config::{AppConfig, ConfigError, LoadOptions};
use relay_webex::api::{ApiClient, ApiError, HttpTransport, ReqwestTransport, TransportError};
use relay_webex::authz::AuthorizationGate;
use relay_webex::commands::RegistryError;
use relay_webex::conversation::ConversationStore;
use relay_webex::credentials::{
    CredentialError, CredentialManager, CredentialSource, OAuthTokenExchanger, StaticToken,
    TokenPair,
};
use relay_webex::devices::DevicesApi;
use relay_webex::events::{Dispatcher, DispatcherSettings};
use relay_webex::messages::MessagesApi;
use relay_webex::people::{PeopleApi, Person};
use relay_webex::responder::WebexResponder;
use relay_webex::rooms::{MembershipsApi, RoomsApi};
use relay_webex::runner::{EventRunner, RunnerSettings};
use relay_webex::webhooks::{EventHydrator, WebhooksApi};
use thiserror::Error;
use tracing::{info, warn};

use crate::commands::{build_registry, CommandDeps};

pub struct Application {
    pub config: AppConfig,
    /// The bot's own platform identity.
    pub bot: Person,
    pub conversations: Arc<ConversationStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub runner: EventRunner,
    pub hydrator: Arc<EventHydrator>,
    pub webhooks: WebhooksApi,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http transport could not be built: {0}")]
    Transport(#[from] TransportError),
    #[error("administrator credentials could not be set up: {0}")]
    Credentials(#[from] CredentialError),
    #[error("command registration failed: {0}")]
    Registry(#[from] RegistryError),
    #[error("bot identity lookup failed: {0}")]
    BotIdentity(#[source] ApiError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let transport = ReqwestTransport::new(request_timeout(&config))?;
    assemble(config, Arc::new(transport)).await
}

/// Wires the engine on top of an arbitrary transport.
pub async fn assemble(
    config: AppConfig,
    transport: Arc<dyn HttpTransport>,
) -> Result<Application, BootstrapError> {
    let base_url = config.webex.api_base_url.clone();
    let bot_client = Arc::new(ApiClient::new(
        base_url.clone(),
        transport.clone(),
        Arc::new(StaticToken::new(config.webex.bot_token.clone())),
    ));
    let admin_client = match admin_credentials(&config)? {
        Some(credentials) => Arc::new(ApiClient::new(base_url, transport, credentials)),
        None => bot_client.clone(),
    };

    let bot_people = PeopleApi::new(bot_client.clone());
    let bot = bot_people.me().await.map_err(BootstrapError::BotIdentity)?;
    info!(
        event_name = "system.bootstrap.bot_identified",
        correlation_id = "bootstrap",
        bot_id = %bot.id,
        "bot identity resolved"
    );

    let gate =
        Arc::new(AuthorizationGate::new(Arc::new(bot_people), config.authorization.admin_emails.clone()));
    let messages = MessagesApi::new(bot_client.clone());

    let registry = build_registry(&CommandDeps {
        messages: messages.clone(),
        directory: PeopleApi::new(admin_client.clone()),
        gate: gate.clone(),
        devices: DevicesApi::new(admin_client),
        rooms: RoomsApi::new(bot_client.clone()),
        memberships: MembershipsApi::new(bot_client.clone()),
        feedback_recipient: config.primary_admin().map(str::to_owned),
        default_domain: config.primary_domain().map(str::to_owned),
        fanout_concurrency: config.runtime.fanout_concurrency,
    })?;
    info!(
        event_name = "system.bootstrap.commands_registered",
        correlation_id = "bootstrap",
        commands = registry.len(),
        "command registry built"
    );

    let conversations = Arc::new(ConversationStore::new(Duration::from_secs(
        config.conversation.inactivity_timeout_secs,
    )));
    let dispatcher = Arc::new(
        Dispatcher::new(
            Arc::new(registry),
            conversations.clone(),
            Arc::new(WebexResponder::new(messages)),
        )
        .with_gate(gate)
        .with_settings(DispatcherSettings {
            bot_name: Some(config.webex.bot_name.clone()),
            approved_domains: config.webex.approved_domains.clone(),
        }),
    );
    let hydrator = Arc::new(EventHydrator::new(bot_client.clone()).ignoring_author(bot.id.clone()));
    let runner = EventRunner::with_hydrator(
        dispatcher.clone(),
        hydrator.clone(),
        RunnerSettings {
            max_concurrent_dispatches: config.runtime.max_concurrent_dispatches,
            sender_idle: Duration::from_secs(config.runtime.sender_idle_secs),
        },
    );

    Ok(Application {
        config,
        bot,
        conversations,
        dispatcher,
        runner,
        hydrator,
        webhooks: WebhooksApi::new(bot_client),
    })
}

/// Points the platform's webhooks at this server. Failures are logged; the
/// server still starts so webhooks can be registered by hand.
pub async fn register_webhooks(app: &Application) {
    let Some(public_url) = &app.config.server.public_url else {
        info!(
            event_name = "system.bootstrap.webhooks_skipped",
            correlation_id = "bootstrap",
            "no public url configured, webhook registration skipped"
        );
        return;
    };
    let target_url =
        format!("{}{}", public_url.trim_end_matches('/'), app.config.server.webhook_path);

    match app.webhooks.ensure_registered(&app.config.webex.bot_name, &target_url).await {
        Ok(created) => info!(
            event_name = "system.bootstrap.webhooks_registered",
            correlation_id = "bootstrap",
            target_url = %target_url,
            created = created.len(),
            "webhooks registered"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.webhooks_failed",
            correlation_id = "bootstrap",
            target_url = %target_url,
            error = %error,
            "webhook registration failed"
        ),
    }
}

fn request_timeout(config: &AppConfig) -> Duration {
    Duration::from_secs(config.webex.request_timeout_secs)
}

fn admin_credentials(
    config: &AppConfig,
) -> Result<Option<Arc<dyn CredentialSource>>, BootstrapError> {
    let oauth = &config.oauth;
    let Some(access_token) = oauth.access_token.clone() else {
        return Ok(None);
    };

    match (&oauth.refresh_token, &oauth.client_id, &oauth.client_secret) {
        (Some(refresh_token), Some(client_id), Some(client_secret)) => {
            let exchanger = OAuthTokenExchanger::new(
                &config.webex.api_base_url,
                client_id.clone(),
                client_secret.clone(),
                request_timeout(config),
            )?;
            let manager = CredentialManager::new(
                TokenPair::new(access_token, refresh_token.clone()),
                Arc::new(exchanger),
            );
            Ok(Some(Arc::new(manager)))
        }
        _ => Ok(Some(Arc::new(StaticToken::new(access_token)))),
    }
}
