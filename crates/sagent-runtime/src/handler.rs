use async_trait::async_trait;
use sagent_core::{Message, Result};

use crate::context::AgentContext;

/// Reacts to received messages. Every registered handler sees every message,
/// in registration order.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(true)` means the handler claimed the message. Claiming does not
    /// stop later handlers from seeing it.
    async fn handle(&self, message: &Message, ctx: &AgentContext) -> Result<bool>;
}
