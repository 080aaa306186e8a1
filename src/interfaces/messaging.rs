use async_trait::async_trait;

use crate::error::Result;
use crate::line::messages::OutboundMessage;

/// Outbound side of the chat platform. `push` delivers an unsolicited
/// notification; `reply` answers a specific inbound event via its reply token.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn push(&self, user_id: &str, text: &str) -> Result<()>;
    async fn reply(&self, reply_token: &str, messages: Vec<OutboundMessage>) -> Result<()>;
}
