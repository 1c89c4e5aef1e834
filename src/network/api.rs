use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Value, json};

use crate::common::{
    Channel, ChannelId, ChatError, ChatMessage, ChatResult, MessagePage, MessagePayload, TeamId,
};

use super::normalize;

/// REST side of the chat backend. Cheap to clone; clones share the
/// connection pool.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    page_size: usize,
}

impl RestClient {
    pub fn new(base_url: &str, token: Option<String>, page_size: usize) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            page_size: page_size.max(1),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `skip`/`limit` query for a 1-based page number.
    pub fn page_query(&self, page: u32) -> [(&'static str, usize); 2] {
        let skip = (page.max(1) as usize - 1) * self.page_size;
        [("skip", skip), ("limit", self.page_size)]
    }

    async fn execute(&self, request: RequestBuilder) -> ChatResult<Value> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ChatError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }
        Ok(response.json::<Value>().await?)
    }

    pub async fn list_channels(&self, team_id: TeamId) -> ChatResult<Vec<Channel>> {
        let body = self
            .execute(self.http.get(self.url(&format!("channels/{team_id}"))))
            .await?;
        normalize::channels(body)
    }

    pub async fn fetch_page(&self, channel_id: ChannelId, page: u32) -> ChatResult<MessagePage> {
        let request = self
            .http
            .get(self.url(&format!("channels/{channel_id}/messages")))
            .query(&self.page_query(page));
        let body = self.execute(request).await?;
        normalize::page(body, channel_id, self.page_size)
    }

    /// Posts a message. Invalid payloads are rejected before any request.
    pub async fn send_message(
        &self,
        channel_id: ChannelId,
        payload: MessagePayload,
    ) -> ChatResult<ChatMessage> {
        payload.validate()?;
        let request = self
            .http
            .post(self.url(&format!("channels/{channel_id}/messages")))
            .json(&json!({ "content": payload.into_wire() }));
        let body = self.execute(request).await?;
        normalize::sent_message(body, channel_id)
    }
}
