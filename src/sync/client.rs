use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::dto::chat_dto::{
    ChatSummary, MessageResponse, OpenChatResponse, SendMessageRequest, StartChatRequest,
    StartChatResponse, UnreadCountResponse,
};
use crate::error::{Error, Result};

/// Client-side view of the chat HTTP API, as seen by one signed-in account.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_chats(&self) -> Result<Vec<ChatSummary>>;

    async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<MessageResponse>>;

    async fn open_chat(&self, chat_id: Uuid) -> Result<OpenChatResponse>;

    async fn unread_count(&self) -> Result<i64>;

    async fn send_message(&self, chat_id: Uuid, content: &str) -> Result<MessageResponse>;

    async fn start_chat(&self, request: &StartChatRequest) -> Result<StartChatResponse>;
}

#[derive(Clone)]
pub struct ChatApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ChatApiClient {
    /// `timeout` bounds every request and should sit below the shortest poll
    /// interval the client runs.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = request.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let message = resp
            .json::<JsonValue>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(JsonValue::as_str).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(error_for_status(status, message))
    }
}

fn error_for_status(status: StatusCode, message: String) -> Error {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::BadRequest(message),
        StatusCode::UNAUTHORIZED => Error::Unauthorized(message),
        StatusCode::FORBIDDEN => Error::Forbidden(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
            Error::StoreUnavailable(message)
        }
        _ => Error::Internal(format!("{}: {}", status, message)),
    }
}

#[async_trait]
impl ChatApi for ChatApiClient {
    async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        self.send(self.client.get(self.url("/api/chats"))).await
    }

    async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<MessageResponse>> {
        self.send(self.client.get(self.url(&format!("/api/chats/{}/messages", chat_id))))
            .await
    }

    async fn open_chat(&self, chat_id: Uuid) -> Result<OpenChatResponse> {
        self.send(self.client.post(self.url(&format!("/api/chats/{}/open", chat_id))))
            .await
    }

    async fn unread_count(&self) -> Result<i64> {
        let body: UnreadCountResponse =
            self.send(self.client.get(self.url("/api/chats/unread"))).await?;
        Ok(body.count)
    }

    async fn send_message(&self, chat_id: Uuid, content: &str) -> Result<MessageResponse> {
        let body = SendMessageRequest {
            content: content.to_string(),
        };
        self.send(
            self.client
                .post(self.url(&format!("/api/chats/{}/messages", chat_id)))
                .json(&body),
        )
        .await
    }

    async fn start_chat(&self, request: &StartChatRequest) -> Result<StartChatResponse> {
        self.send(self.client.post(self.url("/api/chats")).json(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_store_stays_retryable_on_the_client() {
        let err = error_for_status(StatusCode::SERVICE_UNAVAILABLE, "down".into());
        assert!(err.is_retryable());
        assert!(matches!(
            error_for_status(StatusCode::FORBIDDEN, "no".into()),
            Error::Forbidden(_)
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = ChatApiClient::new("http://localhost:8080/", "t", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/api/chats"), "http://localhost:8080/api/chats");
    }
}
