use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::{AttachedFile, ConversationDetail, ConversationSummary, StoredMessage};
use crate::transport::{ByteStreamSource, ChunkSource, MessageTransport, NewMessage};

#[derive(Serialize)]
struct NewConversation<'a> {
    goal: &'a str,
    files: &'a [AttachedFile],
}

#[derive(Deserialize)]
struct CreatedConversation {
    #[serde(deserialize_with = "crate::state::id_as_string")]
    id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for the `/api/v1` conversation endpoints
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let response = self.client.get(self.url("/conversations")).send().await?;
        let response = check_status(response).await?;

        let conversations: Option<Vec<ConversationSummary>> = decode_json(response).await?;
        Ok(conversations.unwrap_or_default())
    }

    pub async fn create_conversation(
        &self,
        goal: &str,
        files: &[AttachedFile],
    ) -> Result<String, ApiError> {
        info!(files = files.len(), "creating conversation");

        let response = self
            .client
            .post(self.url("/conversations"))
            .json(&NewConversation { goal, files })
            .send()
            .await?;
        let response = check_status(response).await?;

        let created: CreatedConversation = decode_json(response).await?;
        Ok(created.id)
    }

    pub async fn get_conversation(&self, id: &str) -> Result<ConversationDetail, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/conversations/{}", id)))
            .send()
            .await?;
        let response = check_status(response).await?;
        decode_json(response).await
    }

    pub async fn list_messages(&self, id: &str) -> Result<Vec<StoredMessage>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/conversations/{}/messages", id)))
            .send()
            .await?;
        let response = check_status(response).await?;

        let messages: Option<Vec<StoredMessage>> = decode_json(response).await?;
        Ok(messages.unwrap_or_default())
    }
}

#[async_trait]
impl MessageTransport for ApiClient {
    async fn post_message(
        &self,
        conversation_id: &str,
        request: &NewMessage,
    ) -> Result<Box<dyn ChunkSource>, ApiError> {
        let url = self.url(&format!("/conversations/{}/messages", conversation_id));
        info!(conversation = conversation_id, "posting message");

        let response = self.client.post(&url).json(request).send().await?;
        let response = check_status(response).await?;

        Ok(Box::new(ByteStreamSource::new(response.bytes_stream())))
    }
}

/// Turn a non-2xx response into [`ApiError::Rejected`] carrying the server's
/// `message` field. Bodies without one fall back to the raw text, then to the
/// status reason.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), body = %text, "request rejected");

    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) if !text.trim().is_empty() => text.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };

    Err(ApiError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn decode_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = ApiClient::new("http://localhost:8090/");
        assert_eq!(client.base_url(), "http://localhost:8090");
        assert_eq!(
            client.url("/conversations/3/messages"),
            "http://localhost:8090/api/v1/conversations/3/messages"
        );
    }

    #[test]
    fn test_created_conversation_accepts_numeric_id() {
        let created: CreatedConversation = serde_json::from_str(r#"{"id":42}"#).unwrap();
        assert_eq!(created.id, "42");
    }
}
