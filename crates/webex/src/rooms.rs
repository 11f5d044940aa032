use std::sync::Arc;

use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::json;

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::people::PeopleApi;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: String,
    pub room_id: String,
    pub person_id: String,
    #[serde(default)]
    pub person_email: Option<String>,
    #[serde(default)]
    pub is_moderator: bool,
}

#[derive(Clone)]
pub struct RoomsApi {
    client: Arc<ApiClient>,
}

impl RoomsApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Creates a group room. The credential's owner becomes its first member.
    pub async fn create(&self, title: &str) -> Result<Room, ApiError> {
        self.client.call_json(&ApiRequest::post("/rooms", json!({ "title": title }))).await
    }

    pub async fn get(&self, room_id: &str) -> Result<Room, ApiError> {
        self.client.call_json(&ApiRequest::get(format!("/rooms/{room_id}"))).await
    }
}

#[derive(Clone)]
pub struct MembershipsApi {
    client: Arc<ApiClient>,
    people: PeopleApi,
}

impl MembershipsApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { people: PeopleApi::new(client.clone()), client }
    }

    pub async fn add(&self, room_id: &str, person_id: &str) -> Result<Membership, ApiError> {
        let body = json!({ "roomId": room_id, "personId": person_id });
        self.client.call_json(&ApiRequest::post("/memberships", body)).await
    }

    /// Looks the address up in the directory first. `None` when nobody holds it.
    pub async fn add_by_email(&self, room_id: &str, email: &str) -> Result<Option<Membership>, ApiError> {
        match self.people.find_by_email(email).await? {
            Some(person) => self.add(room_id, &person.id).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn list(&self, room_id: &str) -> BoxStream<'_, Result<Membership, ApiError>> {
        self.client.list_items(ApiRequest::get("/memberships").with_query("roomId", room_id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::TryStreamExt;
    use serde_json::json;

    use super::{MembershipsApi, RoomsApi};
    use crate::api::testing::{CountingCredentials, ScriptedTransport};
    use crate::api::{ApiClient, ApiResponse, Method};

    fn client(transport: Arc<ScriptedTransport>) -> Arc<ApiClient> {
        Arc::new(ApiClient::new(
            "https://webex.test/v1",
            transport,
            Arc::new(CountingCredentials::default()),
        ))
    }

    #[tokio::test]
    async fn create_posts_title() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(ApiResponse::new(
            200,
            json!({ "id": "room-9", "title": "Launch", "type": "group" }),
        ))]));

        let room = RoomsApi::new(client(transport.clone())).create("Launch").await.expect("room");

        assert_eq!(room.id, "room-9");
        assert_eq!(room.kind.as_deref(), Some("group"));
        let sent = transport.sent().await;
        assert_eq!(sent[0].request.method, Method::Post);
        assert_eq!(sent[0].request.url, "https://webex.test/v1/rooms");
        assert_eq!(sent[0].request.body, Some(json!({ "title": "Launch" })));
    }

    #[tokio::test]
    async fn add_by_email_resolves_the_person_first() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(ApiResponse::new(
                200,
                json!({ "items": [{ "id": "alice", "emails": ["alice@example.com"] }] }),
            )),
            Ok(ApiResponse::new(
                200,
                json!({ "id": "mem-1", "roomId": "room-9", "personId": "alice" }),
            )),
        ]));
        let memberships = MembershipsApi::new(client(transport.clone()));

        let membership = memberships
            .add_by_email("room-9", "alice@example.com")
            .await
            .expect("add")
            .expect("membership");

        assert_eq!(membership.person_id, "alice");
        let sent = transport.sent().await;
        assert_eq!(sent[1].request.url, "https://webex.test/v1/memberships");
        assert_eq!(sent[1].request.body, Some(json!({ "roomId": "room-9", "personId": "alice" })));
    }

    #[tokio::test]
    async fn unknown_email_adds_nobody() {
        let transport =
            Arc::new(ScriptedTransport::new(vec![Ok(ApiResponse::new(200, json!({ "items": [] })))]));
        let memberships = MembershipsApi::new(client(transport.clone()));

        assert_eq!(memberships.add_by_email("room-9", "ghost@example.com").await.expect("add"), None);
        assert_eq!(transport.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_room() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(ApiResponse::new(
            200,
            json!({ "items": [
                { "id": "mem-1", "roomId": "room-9", "personId": "bot", "isModerator": true },
                { "id": "mem-2", "roomId": "room-9", "personId": "alice" }
            ] }),
        ))]));
        let memberships = MembershipsApi::new(client(transport.clone()));

        let members: Vec<_> = memberships.list("room-9").try_collect().await.expect("listing");

        assert_eq!(members.len(), 2);
        assert!(members[0].is_moderator);
        assert_eq!(
            transport.sent().await[0].request.query,
            vec![("roomId".to_owned(), "room-9".to_owned())]
        );
    }
}
