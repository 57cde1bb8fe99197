use futures::FutureExt;
use parking_lot::RwLock;
use sagent_chain::Ledger;
use sagent_core::{Message, Result, SagentError};
use sagent_transport::Transport;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::handler::Handler;

/// Everything behaviours and handlers can reach while the agent runs.
pub struct AgentContext {
    local_addr: String,
    transport: Arc<dyn Transport>,
    ledger: Option<Arc<dyn Ledger>>,
    transfer_amount: u64,
    peers: RwLock<Vec<String>>,
    handlers: Vec<Box<dyn Handler>>,
}

impl AgentContext {
    pub fn new(transport: Arc<dyn Transport>, ledger: Option<Arc<dyn Ledger>>) -> Self {
        Self {
            local_addr: transport.state().local_addr().to_string(),
            transport,
            ledger,
            transfer_amount: 1,
            peers: RwLock::new(Vec::new()),
            handlers: Vec::new(),
        }
    }

    pub fn with_transfer_amount(mut self, amount: u64) -> Self {
        self.transfer_amount = amount;
        self
    }

    pub(crate) fn push_handler(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// `host:port` the transport listens on.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// The ledger address when there is one, the listen address otherwise.
    pub fn identity(&self) -> &str {
        self.ledger
            .as_deref()
            .map(|l| l.address())
            .unwrap_or(self.local_addr.as_str())
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn ledger(&self) -> Option<&dyn Ledger> {
        self.ledger.as_deref()
    }

    /// The ledger, or an error for behaviours that cannot work without one.
    pub fn require_ledger(&self) -> Result<&dyn Ledger> {
        self.ledger()
            .ok_or_else(|| SagentError::Chain("no ledger configured".into()))
    }

    /// Whole tokens the crypto handler sends per matching message.
    pub fn transfer_amount(&self) -> u64 {
        self.transfer_amount
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Known peer addresses, in discovery order.
    pub fn peers(&self) -> Vec<String> {
        self.peers.read().clone()
    }

    /// Track `addr` unless it is already known or is our own identity.
    /// Returns whether it was added.
    pub fn add_peer(&self, addr: &str) -> bool {
        if addr == self.identity() {
            return false;
        }
        let mut peers = self.peers.write();
        if peers.iter().any(|p| p == addr) {
            return false;
        }
        peers.push(addr.to_string());
        true
    }

    /// Run `message` through every handler in order. Errors and panics are
    /// logged per handler and never stop the chain. Returns how many handlers
    /// claimed the message.
    pub async fn process_message(&self, message: &Message) -> usize {
        let mut claimed = 0;
        for handler in &self.handlers {
            match AssertUnwindSafe(handler.handle(message, self))
                .catch_unwind()
                .await
            {
                Ok(Ok(true)) => claimed += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    warn!(handler = handler.name(), id = message.id(), error = %e, "handler failed");
                }
                Err(panic) => {
                    error!(
                        handler = handler.name(),
                        id = message.id(),
                        panic = %panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                }
            }
        }
        debug!(id = message.id(), claimed, "message processed");
        claimed
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
