use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_webex::conversation::ConversationStore;
use relay_webex::runner::EventRunner;
use relay_webex::webhooks::{EventHydrator, WebhookNotification};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct IngressState {
    pub hydrator: Arc<EventHydrator>,
    pub runner: EventRunner,
    pub conversations: Arc<ConversationStore>,
    pub service: String,
    pub started_at: Instant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub active_senders: usize,
    pub pending_chains: usize,
    pub uptime_secs: u64,
}

pub fn router(state: IngressState, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(receive_webhook))
        .route("/health", get(health))
        .with_state(state)
}

/// Queues the notification under its sender straight away. Fetching the
/// content and dispatching happen in that sender's worker, after the response
/// is sent.
pub async fn receive_webhook(
    State(state): State<IngressState>,
    Json(notification): Json<WebhookNotification>,
) -> StatusCode {
    let correlation_id = Uuid::new_v4();
    info!(
        event_name = "ingress.webex.notification_received",
        correlation_id = %correlation_id,
        resource = %notification.resource,
        event = %notification.event,
        "webhook notification received"
    );

    if !state.hydrator.accepts(&notification) {
        debug!(
            event_name = "ingress.webex.notification_ignored",
            correlation_id = %correlation_id,
            resource = %notification.resource,
            "notification does not carry a dispatchable event"
        );
        return StatusCode::OK;
    }

    let occurrence_id = notification.occurrence_id();
    let sender_id = notification.sender_key();
    match state.runner.submit_notification(notification) {
        Ok(()) => {
            debug!(
                event_name = "ingress.webex.event_queued",
                correlation_id = %occurrence_id,
                sender_id = %sender_id,
                "notification queued for its sender"
            );
            StatusCode::ACCEPTED
        }
        Err(error) => {
            warn!(
                event_name = "ingress.webex.event_rejected",
                correlation_id = %occurrence_id,
                sender_id = %sender_id,
                error = %error,
                "event runner refused the notification"
            );
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn health(State(state): State<IngressState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: state.service.clone(),
        active_senders: state.runner.active_senders(),
        pending_chains: state.conversations.len(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    };
    (StatusCode::OK, Json(payload))
}
