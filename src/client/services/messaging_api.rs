use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::client::models::api_types::{
    Conversation, DataEnvelope, SendMessageRequest, ThreadResponse, UnreadCount, UserId, UserSummary,
};
use crate::client::session::SessionContext;

/// Failure of a backend call. The messaging core only cares that a call
/// failed; the variants exist for logs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("cannot build request url: {0}")]
    Url(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// The messaging endpoints of the backend.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError>;
    async fn thread(&self, other_user: UserId) -> Result<ThreadResponse, ApiError>;
    async fn send_message(&self, to: UserId, body: &str) -> Result<(), ApiError>;
    async fn mark_all_read(&self) -> Result<(), ApiError>;
    async fn unread_count(&self) -> Result<u32, ApiError>;
    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ApiError>;
}

pub struct HttpMessagingApi {
    client: Client,
    base_url: Url,
    session: SessionContext,
}

impl HttpMessagingApi {
    pub fn new(base_url: Url, session: SessionContext, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url, session })
    }

    /// Appends path segments to the base url, keeping any prefix such as `/api`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.session.bearer_token()))
            .header(ACCEPT, "application/json")
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!("GET {}", url);
        let resp = self.authorized(self.client.get(url)).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn post(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let resp = self.authorized(request).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { status: status.as_u16(), body })
}

#[async_trait]
impl MessagingApi for HttpMessagingApi {
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoint(&["messages", "conversations"])?;
        let envelope: DataEnvelope<Vec<Conversation>> = self.get_json(url).await?;
        Ok(envelope.data)
    }

    async fn thread(&self, other_user: UserId) -> Result<ThreadResponse, ApiError> {
        let url = self.endpoint(&["messages", "chat", &other_user.to_string()])?;
        self.get_json(url).await
    }

    async fn send_message(&self, to: UserId, body: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["messages", "send", &to.to_string()])?;
        debug!("POST {}", url);
        self.post(self.client.post(url).json(&SendMessageRequest { body })).await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["messages", "mark-all-read"])?;
        debug!("POST {}", url);
        self.post(self.client.post(url)).await
    }

    async fn unread_count(&self) -> Result<u32, ApiError> {
        let url = self.endpoint(&["messages", "unread-count"])?;
        let count: UnreadCount = self.get_json(url).await?;
        Ok(count.count)
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ApiError> {
        let mut url = self.endpoint(&["messages", "search-users"])?;
        url.query_pairs_mut().append_pair("query", query);
        let envelope: DataEnvelope<Vec<UserSummary>> = self.get_json(url).await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpMessagingApi {
        let session = SessionContext::new(1, "t0ken");
        HttpMessagingApi::new(Url::parse(base).unwrap(), session, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_keeps_api_prefix_with_or_without_trailing_slash() {
        for base in ["http://localhost:8000/api", "http://localhost:8000/api/"] {
            let url = api(base).endpoint(&["messages", "chat", "42"]).unwrap();
            assert_eq!(url.as_str(), "http://localhost:8000/api/messages/chat/42");
        }
    }

    #[test]
    fn endpoint_escapes_segments() {
        let url = api("http://localhost/api").endpoint(&["messages", "a b"]).unwrap();
        assert_eq!(url.path(), "/api/messages/a%20b");
    }

    #[test]
    fn status_error_mentions_code() {
        let err = ApiError::Status { status: 401, body: "Unauthenticated.".into() };
        assert!(err.to_string().contains("401"));
    }
}
