//! Outbound messages from real-time clients to the Send API.

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::{error, info};

use crate::error::{RelayError, RelayResult};
use crate::graph::{Attachment, AttachmentPayload, MessagePayload, SendRequest};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageBody {
    #[serde(default)]
    pub psid: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "pageId")]
    pub page_id: Option<String>,
    #[serde(default, rename = "messageType")]
    pub message_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
}

impl MessageKind {
    /// `"image"` selects an image attachment; anything else, including no
    /// value, is plain text.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("image") => MessageKind::Image,
            _ => MessageKind::Text,
        }
    }
}

/// A send request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub recipient_id: String,
    pub page_id: String,
    pub body: String,
    pub kind: MessageKind,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl SendMessageBody {
    pub fn validate(self) -> RelayResult<OutboundMessage> {
        let kind = MessageKind::parse(self.message_type.as_deref());
        match (
            present(self.psid),
            present(self.message),
            present(self.page_id),
        ) {
            (Some(recipient_id), Some(body), Some(page_id)) => Ok(OutboundMessage {
                recipient_id,
                page_id,
                body,
                kind,
            }),
            _ => Err(RelayError::Validation(
                "Missing required fields: psid, message, pageId".to_string(),
            )),
        }
    }
}

impl OutboundMessage {
    /// Shape the Send API payload. For images the body is the image URL.
    pub fn payload(&self) -> MessagePayload {
        match self.kind {
            MessageKind::Image => MessagePayload::Attachment {
                attachment: Attachment {
                    attachment_type: "image".to_string(),
                    payload: AttachmentPayload {
                        url: self.body.clone(),
                        is_reusable: true,
                    },
                },
            },
            MessageKind::Text => MessagePayload::Text {
                text: self.body.clone(),
            },
        }
    }
}

/// Make exactly one Send API attempt for the message. No retries.
pub async fn dispatch(state: &AppState, outbound: &OutboundMessage) -> RelayResult<()> {
    let access_token = state
        .credentials()
        .resolve(&outbound.page_id)
        .ok_or_else(|| RelayError::PageNotConfigured(outbound.page_id.clone()))?;

    let request = SendRequest::response(&outbound.recipient_id, outbound.payload());
    state
        .graph()
        .send_message(access_token, &request)
        .await
        .map_err(|e| {
            error!(
                "Failed to send message to {} via page {}: {:#}",
                outbound.recipient_id, outbound.page_id, e
            );
            RelayError::Upstream("Failed to send message".to_string())
        })?;

    info!(
        "Sent {:?} message to {} via page {}",
        outbound.kind, outbound.recipient_id, outbound.page_id
    );
    Ok(())
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<SendMessageBody>,
) -> RelayResult<&'static str> {
    let outbound = body.validate()?;
    dispatch(&state, &outbound).await?;
    Ok("Message sent successfully")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_for(server: &MockServer) -> AppState {
        let config = Config::from_toml_str(&format!(
            r#"
            [webhook]
            verify_token = "secret"

            [graph]
            base_url = "{}"

            [[pages]]
            id = "A1"
            access_token = "T1"
            "#,
            server.uri()
        ))
        .unwrap();
        AppState::new(config)
    }

    fn body(psid: &str, message: &str, page_id: &str, kind: Option<&str>) -> SendMessageBody {
        SendMessageBody {
            psid: Some(psid.to_string()),
            message: Some(message.to_string()),
            page_id: Some(page_id.to_string()),
            message_type: kind.map(str::to_string),
        }
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let cases = [
            SendMessageBody {
                psid: None,
                ..body("p", "m", "A1", None)
            },
            SendMessageBody {
                message: None,
                ..body("p", "m", "A1", None)
            },
            SendMessageBody {
                page_id: None,
                ..body("p", "m", "A1", None)
            },
            body("p", "", "A1", None),
        ];
        for case in cases {
            assert!(matches!(case.validate(), Err(RelayError::Validation(_))));
        }
    }

    #[test]
    fn test_message_type_defaults_to_text() {
        let outbound = body("p", "hello", "A1", None).validate().unwrap();
        assert_eq!(outbound.kind, MessageKind::Text);
        assert_eq!(
            serde_json::to_value(outbound.payload()).unwrap(),
            json!({"text": "hello"})
        );
        assert_eq!(MessageKind::parse(Some("video")), MessageKind::Text);
    }

    #[test]
    fn test_image_payload_shape() {
        let outbound = body("p", "https://cdn.example/a.png", "A1", Some("image"))
            .validate()
            .unwrap();
        assert_eq!(
            serde_json::to_value(outbound.payload()).unwrap(),
            json!({
                "attachment": {
                    "type": "image",
                    "payload": {"url": "https://cdn.example/a.png", "is_reusable": true}
                }
            })
        );
    }

    #[tokio::test]
    async fn test_text_message_is_sent_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v19.0/me/messages"))
            .and(query_param("access_token", "T1"))
            .and(body_json(json!({
                "recipient": {"id": "psid-1"},
                "message": {"text": "hello"},
                "messaging_type": "RESPONSE"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message_id": "m"})))
            .expect(1)
            .mount(&server)
            .await;

        let state = state_for(&server);
        let outbound = body("psid-1", "hello", "A1", None).validate().unwrap();
        dispatch(&state, &outbound).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_page_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let state = state_for(&server);
        let outbound = body("psid-1", "hello", "B2", None).validate().unwrap();
        let err = dispatch(&state, &outbound).await.unwrap_err();
        assert!(matches!(err, RelayError::PageNotConfigured(ref id) if id == "B2"));
    }

    #[tokio::test]
    async fn test_platform_rejection_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "(#100) No matching user found"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let state = state_for(&server);
        let outbound = body("psid-1", "hello", "A1", None).validate().unwrap();
        let err = dispatch(&state, &outbound).await.unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_image_message_is_sent_as_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v19.0/me/messages"))
            .and(query_param("access_token", "T1"))
            .and(body_json(json!({
                "recipient": {"id": "psid-1"},
                "message": {
                    "attachment": {
                        "type": "image",
                        "payload": {"url": "https://cdn.example/a.png", "is_reusable": true}
                    }
                },
                "messaging_type": "RESPONSE"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message_id": "m"})))
            .expect(1)
            .mount(&server)
            .await;

        let state = state_for(&server);
        let outbound = body("psid-1", "https://cdn.example/a.png", "A1", Some("image"))
            .validate()
            .unwrap();
        dispatch(&state, &outbound).await.unwrap();
    }
}
