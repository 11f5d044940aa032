use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Access/refresh pair. Expiry is only ever learned from a rejected call.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

impl TokenPair {
    pub fn new(access_token: SecretString, refresh_token: SecretString) -> Self {
        Self { access_token, refresh_token }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential refresh is not available for this token")]
    RefreshUnavailable,
    #[error("token exchange failed: {0}")]
    Exchange(String),
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, refresh_token: &SecretString) -> Result<TokenPair, CredentialError>;
}

/// Supplies the bearer credential for outbound calls.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn access_token(&self) -> SecretString;

    /// Replaces `rejected` with a fresh access token. Implementations must
    /// collapse concurrent refreshes of the same rejected token into one exchange.
    async fn refresh(&self, rejected: &SecretString) -> Result<SecretString, CredentialError>;
}

/// Bot tokens are long-lived and have no refresh counterpart.
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialSource for StaticToken {
    async fn access_token(&self) -> SecretString {
        self.token.clone()
    }

    async fn refresh(&self, _rejected: &SecretString) -> Result<SecretString, CredentialError> {
        Err(CredentialError::RefreshUnavailable)
    }
}

pub struct CredentialManager {
    current: Mutex<TokenPair>,
    exchanger: Arc<dyn TokenExchanger>,
}

impl CredentialManager {
    pub fn new(initial: TokenPair, exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self { current: Mutex::new(initial), exchanger }
    }
}

#[async_trait]
impl CredentialSource for CredentialManager {
    async fn access_token(&self) -> SecretString {
        self.current.lock().await.access_token.clone()
    }

    async fn refresh(&self, rejected: &SecretString) -> Result<SecretString, CredentialError> {
        // Held across the exchange: concurrent 401s queue here and see the new pair.
        let mut current = self.current.lock().await;
        if current.access_token.expose_secret() != rejected.expose_secret() {
            return Ok(current.access_token.clone());
        }

        let refreshed = match self.exchanger.exchange(&current.refresh_token).await {
            Ok(pair) => pair,
            Err(error) => {
                warn!(
                    event_name = "webex.credentials.refresh_failed",
                    error = %error,
                    "access token refresh failed"
                );
                return Err(error);
            }
        };

        let access_token = refreshed.access_token.clone();
        *current = refreshed;
        info!(event_name = "webex.credentials.refreshed", "access token refreshed");
        Ok(access_token)
    }
}

/// Exchanges a refresh token at the platform's OAuth token endpoint.
pub struct OAuthTokenExchanger {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

impl OAuthTokenExchanger {
    pub fn new(
        api_base_url: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
        timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CredentialError::Exchange(error.to_string()))?;

        Ok(Self {
            client,
            token_url: format!("{}/access_token", api_base_url.trim_end_matches('/')),
            client_id: client_id.into(),
            client_secret,
        })
    }
}

#[async_trait]
impl TokenExchanger for OAuthTokenExchanger {
    async fn exchange(&self, refresh_token: &SecretString) -> Result<TokenPair, CredentialError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("refresh_token", refresh_token.expose_secret()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|error| CredentialError::Exchange(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Exchange(format!(
                "token endpoint returned {}",
                status.as_u16()
            )));
        }

        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|error| CredentialError::Exchange(error.to_string()))?;

        // Some grants rotate the refresh token, others keep it.
        let refresh_token = match body.refresh_token {
            Some(rotated) => SecretString::from(rotated),
            None => refresh_token.clone(),
        };

        Ok(TokenPair::new(SecretString::from(body.access_token), refresh_token))
    }
}
