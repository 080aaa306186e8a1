#![allow(dead_code)]

use async_trait::async_trait;
use tokio::sync::Mutex;

use concierge_bot::error::{ConciergeBotError, Result};
use concierge_bot::interfaces::messaging::MessagingGateway;
use concierge_bot::interfaces::providers::ChatProvider;
use concierge_bot::line::messages::OutboundMessage;

/// Records every push and reply instead of hitting the wire. Pushes to the
/// user named in `fail_user` are refused with a delivery error.
pub struct RecordingGateway {
    pushes: Mutex<Vec<(String, String)>>,
    replies: Mutex<Vec<(String, Vec<OutboundMessage>)>>,
    fail_user: Mutex<Option<String>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            pushes: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            fail_user: Mutex::new(None),
        }
    }

    pub async fn fail_pushes_for(&self, user_id: Option<&str>) {
        let mut guard = self.fail_user.lock().await;
        *guard = user_id.map(str::to_string);
    }

    pub async fn pushes(&self) -> Vec<(String, String)> {
        self.pushes.lock().await.clone()
    }

    pub async fn replies(&self) -> Vec<(String, Vec<OutboundMessage>)> {
        self.replies.lock().await.clone()
    }

    pub async fn last_reply_text(&self) -> Option<String> {
        let guard = self.replies.lock().await;
        let (_, messages) = guard.last()?;
        first_text(messages).map(str::to_string)
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn push(&self, user_id: &str, text: &str) -> Result<()> {
        if self.fail_user.lock().await.as_deref() == Some(user_id) {
            return Err(ConciergeBotError::Delivery("push refused".to_string()));
        }
        let mut guard = self.pushes.lock().await;
        guard.push((user_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn reply(&self, reply_token: &str, messages: Vec<OutboundMessage>) -> Result<()> {
        let mut guard = self.replies.lock().await;
        guard.push((reply_token.to_string(), messages));
        Ok(())
    }
}

pub struct StaticChatProvider {
    pub reply: String,
}

impl StaticChatProvider {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for StaticChatProvider {
    async fn chat(&self, _user_id: &str, _text: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}

pub struct FailingChatProvider;

#[async_trait]
impl ChatProvider for FailingChatProvider {
    async fn chat(&self, _user_id: &str, _text: &str) -> Result<String> {
        Err(ConciergeBotError::Http("provider down".to_string()))
    }
}

pub fn first_text(messages: &[OutboundMessage]) -> Option<&str> {
    messages.iter().find_map(|message| match message {
        OutboundMessage::Text(text) => Some(text.as_str()),
        _ => None,
    })
}
