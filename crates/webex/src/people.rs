use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, ApiRequest};

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub org_id: Option<String>,
}

impl Person {
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }

    pub fn has_email(&self, email: &str) -> bool {
        let wanted = email.trim().to_lowercase();
        !wanted.is_empty() && self.emails.iter().any(|candidate| candidate.to_lowercase() == wanted)
    }
}

/// Resolves a sender id to the person behind it.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn person(&self, person_id: &str) -> Result<Person, ApiError>;
}

#[derive(Clone)]
pub struct PeopleApi {
    client: Arc<ApiClient>,
    page_size: usize,
}

impl PeopleApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client, page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn get(&self, person_id: &str) -> Result<Person, ApiError> {
        self.client.call_json(&ApiRequest::get(format!("/people/{person_id}"))).await
    }

    /// The identity the client's credential belongs to.
    pub async fn me(&self) -> Result<Person, ApiError> {
        self.get("me").await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Person>, ApiError> {
        let request = ApiRequest::get("/people").with_query("email", email.trim());
        let mut people = self.client.list_items::<Person>(request);
        people.try_next().await
    }

    pub async fn find_by_name(&self, display_name: &str) -> Result<Vec<Person>, ApiError> {
        let request = ApiRequest::get("/people")
            .with_query("displayName", display_name.trim())
            .with_query("max", self.page_size.to_string());
        self.client.list_items(request).try_collect().await
    }

    /// Every person visible to the credential, fetched page by page on demand.
    pub fn list_all(&self) -> BoxStream<'_, Result<Person, ApiError>> {
        let request = ApiRequest::get("/people").with_query("max", self.page_size.to_string());
        self.client.list_items(request)
    }
}

#[async_trait]
impl IdentityResolver for PeopleApi {
    async fn person(&self, person_id: &str) -> Result<Person, ApiError> {
        self.get(person_id).await
    }
}
