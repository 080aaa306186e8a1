use async_trait::async_trait;
use serde_json::json;

use crate::error::{ConciergeBotError, Result};
use crate::interfaces::messaging::MessagingGateway;
use crate::line::messages::OutboundMessage;

const DEFAULT_API_BASE: &str = "https://api.line.me";

/// Messaging API client for pushes and replies.
#[derive(Clone)]
pub struct LineClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl LineClient {
    pub fn new(access_token: String, api_base: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            access_token,
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        self.http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConciergeBotError::Http(e.to_string()))
    }
}

#[async_trait]
impl MessagingGateway for LineClient {
    async fn push(&self, user_id: &str, text: &str) -> Result<()> {
        let body = json!({
            "to": user_id,
            "messages": [OutboundMessage::text(text).to_json()],
        });
        let response = self.post("/v2/bot/message/push", body).await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ConciergeBotError::Delivery(format!(
                "push returned {status}: {detail}"
            )));
        }
        Ok(())
    }

    async fn reply(&self, reply_token: &str, messages: Vec<OutboundMessage>) -> Result<()> {
        let rendered: Vec<serde_json::Value> =
            messages.iter().map(OutboundMessage::to_json).collect();
        let body = json!({
            "replyToken": reply_token,
            "messages": rendered,
        });
        let response = self.post("/v2/bot/message/reply", body).await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ConciergeBotError::Http(format!(
                "reply returned {status}: {detail}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    #[tokio::test]
    async fn push_posts_text_message() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/bot/message/push")
                    .header("authorization", "Bearer token")
                    .json_body_partial(r#"{"to": "U1"}"#);
                then.status(200).json_body(serde_json::json!({}));
            })
            .await;

        let client = LineClient::new("token".to_string(), Some(server.base_url()));
        client.push("U1", "hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn push_failure_maps_to_delivery_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/bot/message/push");
                then.status(500);
            })
            .await;

        let client = LineClient::new("token".to_string(), Some(server.base_url()));
        let err = client.push("U1", "hello").await.unwrap_err();
        assert!(matches!(err, ConciergeBotError::Delivery(_)));
    }
}
