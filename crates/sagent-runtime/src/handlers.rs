//! Built-in message handlers.

use async_trait::async_trait;
use sagent_core::{Message, Result};
use tracing::{info, warn};

use crate::context::AgentContext;
use crate::handler::Handler;

/// Claims and logs messages mentioning a keyword (ASCII case-insensitive).
pub struct KeywordHandler {
    keyword: String,
    name: String,
}

impl KeywordHandler {
    pub fn new(keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        Self {
            name: format!("keyword:{keyword}"),
            keyword,
        }
    }

    /// The greeting handler every agent runs.
    pub fn hello() -> Self {
        Self::new("hello")
    }
}

#[async_trait]
impl Handler for KeywordHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: &Message, _ctx: &AgentContext) -> Result<bool> {
        if !message.mentions(&self.keyword) {
            return Ok(false);
        }
        info!(
            keyword = %self.keyword,
            sender = message.sender().unwrap_or("unknown"),
            "{} message: {:?}",
            self.keyword,
            message.text()
        );
        Ok(true)
    }
}

/// Pays the sender of any message mentioning "crypto".
pub struct CryptoHandler;

#[async_trait]
impl Handler for CryptoHandler {
    fn name(&self) -> &str {
        "crypto"
    }

    async fn handle(&self, message: &Message, ctx: &AgentContext) -> Result<bool> {
        if !message.mentions("crypto") {
            return Ok(false);
        }
        let Some(sender) = message.sender() else {
            warn!(id = message.id(), "crypto message has no sender, not sending tokens");
            return Ok(true);
        };
        info!(sender = %sender, text = %message.text(), "crypto message received");

        let ledger = ctx.require_ledger()?;
        let amount = ctx.transfer_amount();
        match ledger.send_token(sender, amount).await {
            Ok(true) => info!(to = %sender, amount, "sent tokens"),
            Ok(false) => warn!(to = %sender, amount, "token transfer reverted"),
            Err(e) => warn!(to = %sender, amount, error = %e, "token transfer failed"),
        }
        Ok(true)
    }
}
