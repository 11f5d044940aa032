use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub webex: WebexConfig,
    pub oauth: OAuthConfig,
    pub authorization: AuthorizationConfig,
    pub conversation: ConversationConfig,
    pub runtime: RuntimeConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct WebexConfig {
    pub bot_token: SecretString,
    pub bot_name: String,
    pub api_base_url: String,
    pub approved_domains: Vec<String>,
    pub request_timeout_secs: u64,
}

/// Admin-level credentials used for organization-wide listings.
#[derive(Clone, Debug, Default)]
pub struct OAuthConfig {
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
}

#[derive(Clone, Debug, Default)]
pub struct AuthorizationConfig {
    pub admin_emails: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub inactivity_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub max_concurrent_dispatches: usize,
    pub fanout_concurrency: usize,
    pub sender_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub webhook_path: String,
    pub public_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bot_token: Option<String>,
    pub api_base_url: Option<String>,
    pub admin_emails: Option<Vec<String>>,
    pub approved_domains: Option<Vec<String>>,
    pub log_level: Option<String>,
    pub port: Option<u16>,
    pub public_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub load_dotenv: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            webex: WebexConfig {
                bot_token: String::new().into(),
                bot_name: "relay".to_string(),
                api_base_url: "https://webexapis.com/v1".to_string(),
                approved_domains: Vec::new(),
                request_timeout_secs: 30,
            },
            oauth: OAuthConfig::default(),
            authorization: AuthorizationConfig::default(),
            conversation: ConversationConfig { inactivity_timeout_secs: 900 },
            runtime: RuntimeConfig {
                max_concurrent_dispatches: 16,
                fanout_concurrency: 4,
                sender_idle_secs: 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                webhook_path: "/webhooks/webex".to_string(),
                public_url: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        if options.load_dotenv {
            // A missing .env is the normal case outside local development.
            let _ = dotenvy::dotenv();
        }

        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("relay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Primary admin identity, used as the feedback recipient.
    pub fn primary_admin(&self) -> Option<&str> {
        self.authorization.admin_emails.first().map(String::as_str)
    }

    /// Domain used to complete bare user ids typed into cards.
    pub fn primary_domain(&self) -> Option<&str> {
        self.webex.approved_domains.first().map(String::as_str)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(webex) = patch.webex {
            if let Some(bot_token_value) = webex.bot_token {
                self.webex.bot_token = secret_value(bot_token_value);
            }
            if let Some(bot_name) = webex.bot_name {
                self.webex.bot_name = bot_name;
            }
            if let Some(api_base_url) = webex.api_base_url {
                self.webex.api_base_url = api_base_url;
            }
            if let Some(approved_domains) = webex.approved_domains {
                self.webex.approved_domains = normalize_list(approved_domains);
            }
            if let Some(request_timeout_secs) = webex.request_timeout_secs {
                self.webex.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(oauth) = patch.oauth {
            if let Some(access_token_value) = oauth.access_token {
                self.oauth.access_token = Some(secret_value(access_token_value));
            }
            if let Some(refresh_token_value) = oauth.refresh_token {
                self.oauth.refresh_token = Some(secret_value(refresh_token_value));
            }
            if let Some(client_id) = oauth.client_id {
                self.oauth.client_id = Some(client_id);
            }
            if let Some(client_secret_value) = oauth.client_secret {
                self.oauth.client_secret = Some(secret_value(client_secret_value));
            }
        }

        if let Some(authorization) = patch.authorization {
            if let Some(admin_emails) = authorization.admin_emails {
                self.authorization.admin_emails = normalize_list(admin_emails);
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(inactivity_timeout_secs) = conversation.inactivity_timeout_secs {
                self.conversation.inactivity_timeout_secs = inactivity_timeout_secs;
            }
        }

        if let Some(runtime) = patch.runtime {
            if let Some(max_concurrent_dispatches) = runtime.max_concurrent_dispatches {
                self.runtime.max_concurrent_dispatches = max_concurrent_dispatches;
            }
            if let Some(fanout_concurrency) = runtime.fanout_concurrency {
                self.runtime.fanout_concurrency = fanout_concurrency;
            }
            if let Some(sender_idle_secs) = runtime.sender_idle_secs {
                self.runtime.sender_idle_secs = sender_idle_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(webhook_path) = server.webhook_path {
                self.server.webhook_path = webhook_path;
            }
            if let Some(public_url) = server.public_url {
                self.server.public_url = Some(public_url);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RELAY_WEBEX_BOT_TOKEN").or_else(|| read_env("BOT_TOKEN")) {
            self.webex.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("RELAY_WEBEX_BOT_NAME").or_else(|| read_env("BOT_NAME")) {
            self.webex.bot_name = value;
        }
        if let Some(value) = read_env("RELAY_WEBEX_API_BASE_URL") {
            self.webex.api_base_url = value;
        }
        let domains = read_env("RELAY_WEBEX_APPROVED_DOMAINS").or_else(|| read_env("DOMAIN"));
        if let Some(value) = domains {
            self.webex.approved_domains = split_list(&value);
        }
        if let Some(value) = read_env("RELAY_WEBEX_REQUEST_TIMEOUT_SECS") {
            self.webex.request_timeout_secs =
                parse_u64("RELAY_WEBEX_REQUEST_TIMEOUT_SECS", &value)?;
        }

        let access_token =
            read_env("RELAY_OAUTH_ACCESS_TOKEN").or_else(|| read_env("WEBEX_ACCESS_TOKEN"));
        if let Some(value) = access_token {
            self.oauth.access_token = Some(secret_value(value));
        }
        let refresh_token =
            read_env("RELAY_OAUTH_REFRESH_TOKEN").or_else(|| read_env("REFRESH_TOKEN"));
        if let Some(value) = refresh_token {
            self.oauth.refresh_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("RELAY_OAUTH_CLIENT_ID").or_else(|| read_env("CLIENTID")) {
            self.oauth.client_id = Some(value);
        }
        let client_secret =
            read_env("RELAY_OAUTH_CLIENT_SECRET").or_else(|| read_env("SECRETID"));
        if let Some(value) = client_secret {
            self.oauth.client_secret = Some(secret_value(value));
        }

        let admins = read_env("RELAY_AUTHORIZATION_ADMIN_EMAILS").or_else(|| read_env("EMAIL"));
        if let Some(value) = admins {
            self.authorization.admin_emails = split_list(&value);
        }

        if let Some(value) = read_env("RELAY_CONVERSATION_INACTIVITY_TIMEOUT_SECS") {
            self.conversation.inactivity_timeout_secs =
                parse_u64("RELAY_CONVERSATION_INACTIVITY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RELAY_RUNTIME_MAX_CONCURRENT_DISPATCHES") {
            self.runtime.max_concurrent_dispatches =
                parse_usize("RELAY_RUNTIME_MAX_CONCURRENT_DISPATCHES", &value)?;
        }
        if let Some(value) = read_env("RELAY_RUNTIME_FANOUT_CONCURRENCY") {
            self.runtime.fanout_concurrency =
                parse_usize("RELAY_RUNTIME_FANOUT_CONCURRENCY", &value)?;
        }
        if let Some(value) = read_env("RELAY_RUNTIME_SENDER_IDLE_SECS") {
            self.runtime.sender_idle_secs = parse_u64("RELAY_RUNTIME_SENDER_IDLE_SECS", &value)?;
        }

        if let Some(value) = read_env("RELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RELAY_SERVER_PORT") {
            self.server.port = parse_u16("RELAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("RELAY_SERVER_WEBHOOK_PATH") {
            self.server.webhook_path = value;
        }
        if let Some(value) = read_env("RELAY_SERVER_PUBLIC_URL") {
            self.server.public_url = Some(value);
        }

        let log_level = read_env("RELAY_LOGGING_LEVEL").or_else(|| read_env("RELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("RELAY_LOGGING_FORMAT").or_else(|| read_env("RELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.bot_token {
            self.webex.bot_token = secret_value(bot_token);
        }
        if let Some(api_base_url) = overrides.api_base_url {
            self.webex.api_base_url = api_base_url;
        }
        if let Some(admin_emails) = overrides.admin_emails {
            self.authorization.admin_emails = normalize_list(admin_emails);
        }
        if let Some(approved_domains) = overrides.approved_domains {
            self.webex.approved_domains = normalize_list(approved_domains);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(public_url) = overrides.public_url {
            self.server.public_url = Some(public_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_webex(&self.webex)?;
        validate_oauth(&self.oauth)?;
        validate_authorization(&self.authorization)?;
        validate_conversation(&self.conversation)?;
        validate_runtime(&self.runtime)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("relay.toml"), PathBuf::from("config/relay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_webex(webex: &WebexConfig) -> Result<(), ConfigError> {
    if webex.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "webex.bot_token is required. Create a bot at https://developer.webex.com/my-apps and copy its access token".to_string(),
        ));
    }

    let base_url = webex.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "webex.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if webex.request_timeout_secs == 0 || webex.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "webex.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(domain) = webex.approved_domains.iter().find(|domain| domain.contains('@')) {
        return Err(ConfigError::Validation(format!(
            "webex.approved_domains entries must be bare domains, got `{domain}`"
        )));
    }

    Ok(())
}

fn validate_oauth(oauth: &OAuthConfig) -> Result<(), ConfigError> {
    let refresh_parts = [
        oauth.refresh_token.is_some(),
        oauth.client_id.is_some(),
        oauth.client_secret.is_some(),
    ];
    let configured = refresh_parts.iter().filter(|present| **present).count();
    if configured != 0 && configured != refresh_parts.len() {
        return Err(ConfigError::Validation(
            "oauth.refresh_token, oauth.client_id and oauth.client_secret must be set together"
                .to_string(),
        ));
    }

    if configured != 0 && oauth.access_token.is_none() {
        return Err(ConfigError::Validation(
            "oauth.access_token is required when refresh credentials are configured".to_string(),
        ));
    }

    Ok(())
}

fn validate_authorization(authorization: &AuthorizationConfig) -> Result<(), ConfigError> {
    if let Some(email) = authorization.admin_emails.iter().find(|email| !email.contains('@')) {
        return Err(ConfigError::Validation(format!(
            "authorization.admin_emails entries must be email addresses, got `{email}`"
        )));
    }
    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.inactivity_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.inactivity_timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_runtime(runtime: &RuntimeConfig) -> Result<(), ConfigError> {
    if runtime.max_concurrent_dispatches == 0 {
        return Err(ConfigError::Validation(
            "runtime.max_concurrent_dispatches must be greater than zero".to_string(),
        ));
    }
    if runtime.fanout_concurrency == 0 {
        return Err(ConfigError::Validation(
            "runtime.fanout_concurrency must be greater than zero".to_string(),
        ));
    }
    if runtime.sender_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "runtime.sender_idle_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if !server.webhook_path.starts_with('/') {
        return Err(ConfigError::Validation(
            "server.webhook_path must start with `/`".to_string(),
        ));
    }

    if let Some(public_url) = &server.public_url {
        if !public_url.starts_with("http://") && !public_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "server.public_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    normalize_list(value.split(',').map(str::to_owned).collect())
}

fn normalize_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    webex: Option<WebexPatch>,
    oauth: Option<OAuthPatch>,
    authorization: Option<AuthorizationPatch>,
    conversation: Option<ConversationPatch>,
    runtime: Option<RuntimePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WebexPatch {
    bot_token: Option<String>,
    bot_name: Option<String>,
    api_base_url: Option<String>,
    approved_domains: Option<Vec<String>>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthPatch {
    access_token: Option<String>,
    refresh_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorizationPatch {
    admin_emails: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    inactivity_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimePatch {
    max_concurrent_dispatches: Option<usize>,
    fanout_concurrency: Option<usize>,
    sender_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    webhook_path: Option<String>,
    public_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
