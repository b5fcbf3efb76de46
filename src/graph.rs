use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::GraphConfig;

/// Display metadata for a user who messaged a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub profile_pic: Option<String>,
}

impl UserProfile {
    /// Placeholder used when the real profile cannot be fetched:
    /// `User <last four characters of the id>`, no picture.
    pub fn fallback(user_id: &str) -> Self {
        let suffix = user_id
            .char_indices()
            .rev()
            .nth(3)
            .map(|(i, _)| &user_id[i..])
            .unwrap_or(user_id);
        Self {
            name: format!("User {}", suffix),
            profile_pic: None,
        }
    }
}

/// Page metadata returned by `/pages-info`. `picture` is passed through in the
/// Graph API's own shape (`{"data": {"url": ...}}`).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageInfo {
    pub id: String,
    pub name: Option<String>,
    pub picture: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PageInfoResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<Value>,
}

/// Body of a Send API call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendRequest {
    pub recipient: Recipient,
    pub message: MessagePayload,
    pub messaging_type: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Recipient {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MessagePayload {
    Text { text: String },
    Attachment { attachment: Attachment },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub attachment_type: String,
    pub payload: AttachmentPayload,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttachmentPayload {
    pub url: String,
    pub is_reusable: bool,
}

impl SendRequest {
    pub fn response(recipient_id: &str, message: MessagePayload) -> Self {
        Self {
            recipient: Recipient {
                id: recipient_id.to_string(),
            },
            message,
            messaging_type: "RESPONSE",
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    message: String,
}

/// Thin client over the Graph API endpoints the relay needs.
#[derive(Debug, Clone)]
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl GraphClient {
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        }
    }

    pub async fn user_profile(&self, user_id: &str, access_token: &str) -> Result<UserProfile> {
        let url = format!("{}/{}", self.base_url, user_id);
        debug!("Fetching user profile: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("fields", "name,profile_pic"), ("access_token", access_token)])
            .send()
            .await
            .context("Failed to send profile request to Graph API")?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .context("Failed to parse Graph API profile response")
    }

    pub async fn page_info(&self, page_id: &str, access_token: &str) -> Result<PageInfo> {
        let url = format!("{}/{}", self.base_url, page_id);
        debug!("Fetching page info: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("fields", "name,picture{url}"), ("access_token", access_token)])
            .send()
            .await
            .context("Failed to send page request to Graph API")?;

        let response = check_status(response).await?;
        let page: PageInfoResponse = response
            .json()
            .await
            .context("Failed to parse Graph API page response")?;

        Ok(PageInfo {
            id: page_id.to_string(),
            name: page.name,
            picture: page.picture,
        })
    }

    pub async fn send_message(&self, access_token: &str, request: &SendRequest) -> Result<()> {
        let url = format!("{}/{}/me/messages", self.base_url, self.api_version);
        debug!("Sending message to {}", request.recipient.id);

        let response = self
            .client
            .post(&url)
            .query(&[("access_token", access_token)])
            .json(request)
            .send()
            .await
            .context("Failed to send request to Send API")?;

        check_status(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into an error carrying the platform's
/// `error.message` when present, the raw body otherwise.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<GraphErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);
    anyhow::bail!("Graph API error ({}): {}", status, detail);
}
