#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_core::config::AppConfig;
use relay_server::bootstrap::{assemble, Application};
use relay_webex::api::{ApiRequest, ApiResponse, HttpTransport, Method, TransportError};
use secrecy::SecretString;
use serde_json::{json, Value};

pub const BASE_URL: &str = "https://webex.test/v1";
pub const BOT_ID: &str = "bot-id";
pub const ADMIN_ID: &str = "boss-id";
pub const ADMIN_EMAIL: &str = "boss@example.com";
pub const ROOM_ID: &str = "room-1";

const PAGE_SIZE: usize = 2;

/// In-memory platform: a small directory, stored messages and card
/// submissions, and a record of everything sent or deleted.
#[derive(Default)]
pub struct FakePlatform {
    people: Vec<Value>,
    messages: Mutex<HashMap<String, Value>>,
    actions: Mutex<HashMap<String, Value>>,
    failing_recipients: HashSet<String>,
    failing_listing_from: Option<usize>,
    message_delays: HashMap<String, Duration>,
    sent: Mutex<Vec<Value>>,
    devices: Mutex<Vec<Value>>,
    rooms: Mutex<Vec<Value>>,
    memberships: Mutex<Vec<Value>>,
    deleted: Mutex<Vec<String>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            people: vec![
                person(ADMIN_ID, "Boss", &[ADMIN_EMAIL]),
                person("alice-id", "Alice", &["alice@example.com"]),
                person("bob-id", "Bob", &["bob@example.com"]),
                person("room-device", "Room Device", &[]),
                person("carol-id", "Carol", &["carol@example.com"]),
            ],
            ..Self::default()
        }
    }

    /// Sends addressed to `recipient` (an email or person id) fail upstream.
    pub fn failing_for(mut self, recipient: &str) -> Self {
        self.failing_recipients.insert(recipient.to_owned());
        self
    }

    /// The people listing answers 502 for the page starting at `cursor`.
    pub fn failing_listing_from(mut self, cursor: usize) -> Self {
        self.failing_listing_from = Some(cursor);
        self
    }

    /// Fetching message `id` takes `delay` longer than the others.
    pub fn delaying_message(mut self, id: &str, delay: Duration) -> Self {
        self.message_delays.insert(id.to_owned(), delay);
        self
    }

    /// A phone already registered under `mac`.
    pub fn with_device(self, mac: &str) -> Self {
        self.devices.lock().expect("devices lock").push(json!({ "mac": mac }));
        self
    }

    pub fn devices(&self) -> Vec<Value> {
        self.devices.lock().expect("devices lock").clone()
    }

    pub fn rooms(&self) -> Vec<Value> {
        self.rooms.lock().expect("rooms lock").clone()
    }

    pub fn memberships(&self) -> Vec<Value> {
        self.memberships.lock().expect("memberships lock").clone()
    }

    pub fn store_message(&self, id: &str, body: Value) {
        self.messages.lock().expect("messages lock").insert(id.to_owned(), body);
    }

    pub fn store_action(&self, id: &str, body: Value) {
        self.actions.lock().expect("actions lock").insert(id.to_owned(), body);
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn sent_to(&self, field: &str) -> Vec<Value> {
        self.sent().into_iter().filter(|body| body.get(field).is_some()).collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("deleted lock").clone()
    }

    fn find_person(&self, id: &str) -> Option<Value> {
        let id = if id == "me" { BOT_ID } else { id };
        if id == BOT_ID {
            return Some(person(BOT_ID, "relay", &["relay@webex.bot"]));
        }
        self.people.iter().find(|person| person["id"] == id).cloned()
    }

    fn list_people(&self, request: &ApiRequest) -> ApiResponse {
        let email = query(request, "email");
        let matching: Vec<Value> = self
            .people
            .iter()
            .filter(|person| match &email {
                Some(email) => person["emails"]
                    .as_array()
                    .is_some_and(|emails| emails.iter().any(|value| value == email.as_str())),
                None => true,
            })
            .cloned()
            .collect();

        let start: usize = query(request, "cursor").and_then(|cursor| cursor.parse().ok()).unwrap_or(0);
        if self.failing_listing_from == Some(start) {
            return ApiResponse::new(502, json!({ "message": "listing unavailable" }));
        }
        let end = (start + PAGE_SIZE).min(matching.len());
        let page = matching[start..end].to_vec();
        let response = ApiResponse::new(200, json!({ "items": page }));
        if end < matching.len() {
            response.with_next_cursor(end.to_string())
        } else {
            response
        }
    }

    fn post_message(&self, body: &Value) -> ApiResponse {
        let recipient = ["roomId", "toPersonId", "toPersonEmail"]
            .iter()
            .find_map(|field| body.get(*field).and_then(Value::as_str))
            .unwrap_or_default();
        if self.failing_recipients.contains(recipient) {
            return ApiResponse::new(500, json!({ "message": "delivery failed" }));
        }

        let mut sent = self.sent.lock().expect("sent lock");
        sent.push(body.clone());
        let mut stored = body.clone();
        stored["id"] = json!(format!("msg-{}", sent.len()));
        ApiResponse::new(200, stored)
    }

    fn register_device(&self, body: &Value) -> ApiResponse {
        let mut devices = self.devices.lock().expect("devices lock");
        if devices.iter().any(|device| device["mac"] == body["mac"]) {
            return ApiResponse::new(409, json!({ "message": "device already exists" }));
        }
        let mut device = body.clone();
        device["id"] = json!(format!("device-{}", devices.len() + 1));
        devices.push(device.clone());
        ApiResponse::new(200, device)
    }

    fn create_room(&self, body: &Value) -> ApiResponse {
        let mut rooms = self.rooms.lock().expect("rooms lock");
        let room = json!({
            "id": format!("room-new-{}", rooms.len() + 1),
            "title": body["title"],
            "type": "group",
        });
        rooms.push(room.clone());
        ApiResponse::new(200, room)
    }

    fn add_member(&self, body: &Value) -> ApiResponse {
        let mut memberships = self.memberships.lock().expect("memberships lock");
        let mut membership = body.clone();
        membership["id"] = json!(format!("membership-{}", memberships.len() + 1));
        memberships.push(membership.clone());
        ApiResponse::new(200, membership)
    }
}

#[async_trait]
impl HttpTransport for FakePlatform {
    async fn send(
        &self,
        request: &ApiRequest,
        _token: &SecretString,
    ) -> Result<ApiResponse, TransportError> {
        let path = request.url.strip_prefix(BASE_URL).unwrap_or(&request.url).to_owned();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        if let (Method::Get, ["messages", id]) = (request.method, segments.as_slice()) {
            if let Some(delay) = self.message_delays.get(*id) {
                tokio::time::sleep(*delay).await;
            }
        }

        let body = request.body.as_ref().unwrap_or(&Value::Null);
        let response = match (request.method, segments.as_slice()) {
            (Method::Get, ["people"]) => self.list_people(request),
            (Method::Get, ["people", id]) => match self.find_person(id) {
                Some(person) => ApiResponse::new(200, person),
                None => not_found(),
            },
            (Method::Post, ["messages"]) => self.post_message(body),
            (Method::Post, ["devices"]) => self.register_device(body),
            (Method::Post, ["rooms"]) => self.create_room(body),
            (Method::Post, ["memberships"]) => self.add_member(body),
            (Method::Get, ["messages", id]) => {
                match self.messages.lock().expect("messages lock").get(*id) {
                    Some(message) => ApiResponse::new(200, message.clone()),
                    None => not_found(),
                }
            }
            (Method::Delete, ["messages", id]) => {
                self.deleted.lock().expect("deleted lock").push((*id).to_owned());
                ApiResponse::new(204, Value::Null)
            }
            (Method::Get, ["attachment", "actions", id]) => {
                match self.actions.lock().expect("actions lock").get(*id) {
                    Some(action) => ApiResponse::new(200, action.clone()),
                    None => not_found(),
                }
            }
            (Method::Get, ["webhooks"]) => ApiResponse::new(200, json!({ "items": [] })),
            _ => not_found(),
        };
        Ok(response)
    }
}

pub fn person(id: &str, name: &str, emails: &[&str]) -> Value {
    json!({ "id": id, "displayName": name, "emails": emails, "orgId": "org-1" })
}

pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.webex.bot_token = "bot-token".to_owned().into();
    config.webex.api_base_url = BASE_URL.to_owned();
    config.webex.approved_domains = vec!["example.com".to_owned()];
    config.authorization.admin_emails = vec![ADMIN_EMAIL.to_owned()];
    config
}

pub async fn app(platform: &Arc<FakePlatform>) -> Application {
    assemble(config(), platform.clone()).await.expect("application should assemble")
}

fn query(request: &ApiRequest, key: &str) -> Option<String> {
    request.query.iter().find(|(name, _)| name == key).map(|(_, value)| value.clone())
}

fn not_found() -> ApiResponse {
    ApiResponse::new(404, json!({ "message": "not found" }))
}
