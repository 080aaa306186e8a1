use async_trait::async_trait;

use crate::error::Result;

/// Generative-AI collaborator that answers free-text conversation. Anything
/// that is not part of an active dialogue flow is routed here.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, user_id: &str, text: &str) -> Result<String>;
}
