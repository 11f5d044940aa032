use std::sync::Arc;

use tracing::warn;

use crate::people::{IdentityResolver, Person};

/// Identity checks for privileged commands. Every lookup failure denies.
pub struct AuthorizationGate {
    resolver: Arc<dyn IdentityResolver>,
    admin_emails: Vec<String>,
}

impl AuthorizationGate {
    pub fn new(resolver: Arc<dyn IdentityResolver>, admin_emails: Vec<String>) -> Self {
        let admin_emails = admin_emails
            .into_iter()
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty())
            .collect();
        Self { resolver, admin_emails }
    }

    pub fn admin_emails(&self) -> &[String] {
        &self.admin_emails
    }

    /// True only when `person_id` resolves to a person holding `required_identity`.
    /// Resolved identities are not cached; each check performs a fresh lookup.
    pub async fn is_allowed(&self, person_id: &str, required_identity: &str) -> bool {
        if required_identity.trim().is_empty() {
            return false;
        }
        self.resolve(person_id).await.is_some_and(|person| person.has_email(required_identity))
    }

    /// Like [`Self::is_allowed`] against each configured administrator, with a single lookup.
    pub async fn is_admin(&self, person_id: &str) -> bool {
        if self.admin_emails.is_empty() {
            return false;
        }
        self.resolve(person_id)
            .await
            .is_some_and(|person| self.admin_emails.iter().any(|admin| person.has_email(admin)))
    }

    /// Whether the sender's primary address belongs to one of `domains`.
    pub async fn in_approved_domain(&self, person_id: &str, domains: &[String]) -> bool {
        self.resolve(person_id).await.is_some_and(|person| {
            person.primary_email().is_some_and(|email| email_in_domains(email, domains))
        })
    }

    async fn resolve(&self, person_id: &str) -> Option<Person> {
        match self.resolver.person(person_id).await {
            Ok(person) => Some(person),
            Err(error) => {
                warn!(
                    event_name = "webex.authz.lookup_failed",
                    sender_id = %person_id,
                    error = %error,
                    "identity lookup failed, denying"
                );
                None
            }
        }
    }
}

pub fn email_in_domains(email: &str, domains: &[String]) -> bool {
    let Some((_, domain)) = email.trim().rsplit_once('@') else {
        return false;
    };
    let domain = domain.to_lowercase();
    domains.iter().any(|approved| approved.trim().to_lowercase() == domain)
}
