//! Webhook receiver: subscription handshake and inbound message
//! notifications.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{RelayError, RelayResult};
use crate::graph::UserProfile;
use crate::server::AppState;

/// `hub.mode` value sent by the platform when subscribing.
pub const SUBSCRIBE_MODE: &str = "subscribe";
/// `object` tag of page notifications.
pub const PAGE_OBJECT: &str = "page";
/// Acknowledgement body expected by the platform.
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

// ── Inbound notification payload ───────────────────────────────────────────────

/// Top-level webhook body. Entries stay raw so that one malformed event only
/// costs that event, not the whole batch.
#[derive(Debug, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    messaging: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    pub sender: Party,
    pub recipient: Party,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Party {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub mid: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<Value>>,
    /// Set on copies of messages the page itself sent.
    #[serde(default)]
    pub is_echo: bool,
}

// ── Normalized event published to real-time clients ────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InboundEvent {
    #[serde(rename = "pageId")]
    pub page_id: String,
    pub sender: EventSender,
    pub message: EventMessage,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventSender {
    pub id: String,
    pub name: String,
    pub profile_pic: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventMessage {
    pub mid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl InboundEvent {
    pub fn new(
        page_id: String,
        sender_id: String,
        profile: UserProfile,
        message: IncomingMessage,
        timestamp: Option<u64>,
    ) -> Self {
        Self {
            page_id,
            sender: EventSender {
                id: sender_id,
                name: profile.name,
                profile_pic: profile.profile_pic,
            },
            message: EventMessage {
                mid: message.mid,
                text: message.text,
                attachments: message.attachments,
                timestamp,
            },
        }
    }
}

/// Parse the messaging events of every entry. Entries or events that do not
/// match the expected shape are logged and skipped.
fn messaging_events(entries: Vec<Value>) -> Vec<MessagingEvent> {
    let mut events = Vec::new();
    for raw_entry in entries {
        let entry: Entry = match serde_json::from_value(raw_entry) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping malformed webhook entry: {}", e);
                continue;
            }
        };
        for raw_event in entry.messaging {
            match serde_json::from_value(raw_event) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping malformed messaging event: {}", e),
            }
        }
    }
    events
}

/// Check a subscription handshake. Returns the challenge to echo back.
pub fn verify_subscription(query: VerifyQuery, verify_token: &str) -> RelayResult<String> {
    let mode_ok = query.mode.as_deref() == Some(SUBSCRIBE_MODE);
    let token_ok = query.verify_token.as_deref() == Some(verify_token);
    if mode_ok && token_ok {
        Ok(query.challenge.unwrap_or_default())
    } else {
        Err(RelayError::Forbidden)
    }
}

pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> RelayResult<String> {
    match verify_subscription(query, &state.config().webhook.verify_token) {
        Ok(challenge) => {
            info!("Webhook verified");
            Ok(challenge)
        }
        Err(e) => {
            warn!("Webhook verification rejected");
            Err(e)
        }
    }
}

/// Normalize and publish every message event of a notification batch.
///
/// All events of every entry are handled; echoes and non-message events
/// (deliveries, reads, postbacks) are skipped. Returns the number of events
/// published.
pub async fn process_notification(
    state: &AppState,
    notification: Notification,
) -> RelayResult<usize> {
    if notification.object != PAGE_OBJECT {
        warn!("Ignoring notification for object '{}'", notification.object);
        return Err(RelayError::NotFound);
    }

    let mut published = 0;
    for event in messaging_events(notification.entry) {
        let Some(message) = event.message else {
            debug!("Skipping non-message event from {}", event.sender.id);
            continue;
        };
        if message.is_echo {
            debug!("Skipping echo {}", message.mid);
            continue;
        }

        let sender_id = event.sender.id;
        let page_id = event.recipient.id;
        let profile = state
            .profiles()
            .resolve(state.graph(), state.credentials(), &sender_id, &page_id)
            .await;

        let inbound = InboundEvent::new(page_id, sender_id, profile, message, event.timestamp);
        info!(
            "Relaying message {} from {} ({}) on page {}",
            inbound.message.mid, inbound.sender.name, inbound.sender.id, inbound.page_id
        );
        state.broadcaster().broadcast(inbound);
        published += 1;
    }

    Ok(published)
}

pub async fn receive(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> RelayResult<&'static str> {
    let published = process_notification(&state, notification).await?;
    debug!("Notification handled, {} event(s) published", published);
    Ok(EVENT_RECEIVED)
}
