use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::{ConciergeBotError, Result};
use crate::interfaces::providers::ChatProvider;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-pro";

/// Oldest turns are dropped beyond this many (user + model) entries per user.
const MAX_HISTORY_TURNS: usize = 20;

const PERSONA: &str = "You are a professional personal assistant named Happy. \
You help with notes, schedules and reminders, answer briefly and politely, \
remember the earlier turns of the conversation, and you never offer to create \
or delete schedules yourself; the menu does that.";

#[derive(Clone)]
struct Turn {
    role: &'static str,
    text: String,
}

/// Free-text conversation backend over the Gemini REST API. Keeps a bounded
/// per-user history so replies stay coherent across turns.
pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    sessions: Mutex<HashMap<String, Vec<Turn>>>,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn chat(&self, user_id: &str, text: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let contents: Vec<Value> = {
            let sessions = self.sessions.lock().await;
            let history = sessions.get(user_id).map(Vec::as_slice).unwrap_or(&[]);
            history
                .iter()
                .map(|turn| json!({"role": turn.role, "parts": [{"text": turn.text}]}))
                .chain(std::iter::once(
                    json!({"role": "user", "parts": [{"text": text}]}),
                ))
                .collect()
        };
        let body = json!({
            "systemInstruction": {"parts": [{"text": PERSONA}]},
            "contents": contents,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConciergeBotError::Http(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(ConciergeBotError::Http(format!(
                "gemini returned {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ConciergeBotError::Serialization(e.to_string()))?;
        let reply = extract_text(&payload)
            .ok_or_else(|| ConciergeBotError::Runtime("gemini response had no text".to_string()))?;

        // Failed exchanges are not remembered; only a delivered reply extends
        // the session.
        let mut sessions = self.sessions.lock().await;
        let history = sessions.entry(user_id.to_string()).or_default();
        history.push(Turn {
            role: "user",
            text: text.to_string(),
        });
        history.push(Turn {
            role: "model",
            text: reply.clone(),
        });
        if history.len() > MAX_HISTORY_TURNS {
            let excess = history.len() - MAX_HISTORY_TURNS;
            history.drain(..excess);
        }

        Ok(reply)
    }
}

fn extract_text(payload: &Value) -> Option<String> {
    let text = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()?;
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    fn reply_body(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": {"parts": [{"text": text}]}
            }]
        })
    }

    #[tokio::test]
    async fn chat_extracts_candidate_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-pro:generateContent")
                    .query_param("key", "k");
                then.status(200).json_body(reply_body("hello there"));
            })
            .await;

        let provider =
            GeminiProvider::new("k".to_string(), None, Some(server.base_url()));
        let reply = provider.chat("U1", "hi").await.unwrap();
        assert_eq!(reply, "hello there");
    }

    #[tokio::test]
    async fn chat_replays_earlier_turns_of_the_session() {
        let server = MockServer::start_async().await;
        let first = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(reply_body("I am Happy"));
            })
            .await;

        let provider =
            GeminiProvider::new("k".to_string(), None, Some(server.base_url()));
        provider.chat("U1", "who are you?").await.unwrap();
        first.delete_async().await;

        // The second request must carry the first exchange verbatim.
        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .body_contains("who are you?")
                    .body_contains("I am Happy");
                then.status(200).json_body(reply_body("as I said"));
            })
            .await;

        let reply = provider.chat("U1", "say that again").await.unwrap();
        assert_eq!(reply, "as I said");
        second.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn sessions_are_kept_per_user() {
        let server = MockServer::start_async().await;
        let first = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(reply_body("noted"));
            })
            .await;

        let provider =
            GeminiProvider::new("k".to_string(), None, Some(server.base_url()));
        provider.chat("U1", "my name is Alex").await.unwrap();
        first.delete_async().await;

        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(reply_body("hi"));
            })
            .await;
        provider.chat("U2", "hello").await.unwrap();

        let sessions = provider.sessions.lock().await;
        assert_eq!(sessions.get("U2").map(Vec::len), Some(2));
        assert!(sessions
            .get("U2")
            .unwrap()
            .iter()
            .all(|turn| !turn.text.contains("Alex")));
    }

    #[tokio::test]
    async fn chat_surfaces_http_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500);
            })
            .await;

        let provider =
            GeminiProvider::new("k".to_string(), None, Some(server.base_url()));
        let err = provider.chat("U1", "hi").await.unwrap_err();
        assert!(matches!(err, ConciergeBotError::Http(_)));
    }
}
