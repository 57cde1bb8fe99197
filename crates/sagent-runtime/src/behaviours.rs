//! Built-in behaviours.

use async_trait::async_trait;
use sagent_core::{Message, Result};
use tracing::{debug, info, warn};

use crate::behaviour::{Behaviour, Cooldown};
use crate::context::AgentContext;

/// Words random messages are built from.
pub const VOCABULARY: [&str; 10] = [
    "hello", "sun", "world", "space", "moon", "crypto", "sky", "ocean", "universe", "human",
];

// ── Peer discovery ─────────────────────────────────────────────

/// Tracks every smart agent registered with the factory.
pub struct DiscoverPeers {
    cooldown: Cooldown,
}

impl DiscoverPeers {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown: Cooldown::from_secs(cooldown_secs),
        }
    }
}

#[async_trait]
impl Behaviour for DiscoverPeers {
    fn name(&self) -> &str {
        "discover_peers"
    }

    fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn cooldown_mut(&mut self) -> &mut Cooldown {
        &mut self.cooldown
    }

    async fn logic(&mut self, ctx: &AgentContext) -> Result<()> {
        let found = ctx.require_ledger()?.discover_peers().await?;
        for addr in found {
            if ctx.add_peer(&addr) {
                info!(peer = %addr, "discovered new agent");
            }
        }
        Ok(())
    }
}

// ── Balance ────────────────────────────────────────────────────

/// Logs the agent's token balance. Ledger failures are logged, not raised.
pub struct CheckBalance {
    cooldown: Cooldown,
}

impl CheckBalance {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown: Cooldown::from_secs(cooldown_secs),
        }
    }
}

#[async_trait]
impl Behaviour for CheckBalance {
    fn name(&self) -> &str {
        "check_balance"
    }

    fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn cooldown_mut(&mut self) -> &mut Cooldown {
        &mut self.cooldown
    }

    async fn logic(&mut self, ctx: &AgentContext) -> Result<()> {
        let ledger = ctx.require_ledger()?;
        match ledger.check_balance().await {
            Ok(balance) => info!("balance of {} is {}", ledger.address(), balance),
            Err(e) => warn!(error = %e, "error checking balance"),
        }
        Ok(())
    }
}

// ── Random messages ────────────────────────────────────────────

/// Where a generated message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The transport outbox, sent on the next flush.
    Outbox,
    /// Straight into every known peer's smart-agent contract inbox.
    Contract,
}

type WordPicker = Box<dyn Fn() -> String + Send + Sync>;

/// Emits a two-word message from [`VOCABULARY`] each period.
pub struct RandomMessage {
    cooldown: Cooldown,
    delivery: Delivery,
    next_id: u64,
    pick: WordPicker,
}

pub(crate) fn random_words() -> String {
    let word = || VOCABULARY[(rand::random::<u64>() % VOCABULARY.len() as u64) as usize];
    format!("{} {}", word(), word())
}

impl RandomMessage {
    pub fn new(cooldown_secs: u64, delivery: Delivery) -> Self {
        Self {
            cooldown: Cooldown::from_secs(cooldown_secs),
            delivery,
            next_id: 1,
            pick: Box::new(random_words),
        }
    }

    /// Replace the random word source.
    pub fn with_words(mut self, pick: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.pick = Box::new(pick);
        self
    }

    /// Id the next generated message will carry.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }
}

#[async_trait]
impl Behaviour for RandomMessage {
    fn name(&self) -> &str {
        "random_message"
    }

    fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn cooldown_mut(&mut self) -> &mut Cooldown {
        &mut self.cooldown
    }

    async fn logic(&mut self, ctx: &AgentContext) -> Result<()> {
        let text = (self.pick)();
        let id = self.next_id;

        match self.delivery {
            Delivery::Outbox => {
                debug!(id, text = %text, "queueing random message");
                ctx.transport().send_to_outbox(Message::new(id, text));
            }
            Delivery::Contract => {
                let ledger = ctx.require_ledger()?;
                let me = ledger.address();
                for peer in ctx.peers() {
                    match ledger.send_contract_message(me, &peer, &text).await {
                        Ok(tx) => debug!(peer = %peer, tx = %tx, id, "message sent to contract"),
                        Err(e) => warn!(peer = %peer, error = %e, "sending message to contract failed"),
                    }
                }
            }
        }

        self.next_id += 1;
        Ok(())
    }
}

// ── Inbox ──────────────────────────────────────────────────────

/// Dispatches everything the transport has received.
pub struct DrainInbox {
    cooldown: Cooldown,
}

impl DrainInbox {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown: Cooldown::from_secs(cooldown_secs),
        }
    }
}

#[async_trait]
impl Behaviour for DrainInbox {
    fn name(&self) -> &str {
        "drain_inbox"
    }

    fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn cooldown_mut(&mut self) -> &mut Cooldown {
        &mut self.cooldown
    }

    async fn logic(&mut self, ctx: &AgentContext) -> Result<()> {
        while let Some(message) = ctx.transport().received().pop() {
            ctx.process_message(&message).await;
        }
        Ok(())
    }
}

/// Reads one entry from the agent's contract inbox, dispatches it and
/// acknowledges it.
pub struct ContractInbox {
    cooldown: Cooldown,
}

impl ContractInbox {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown: Cooldown::from_secs(cooldown_secs),
        }
    }
}

#[async_trait]
impl Behaviour for ContractInbox {
    fn name(&self) -> &str {
        "contract_inbox"
    }

    fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn cooldown_mut(&mut self) -> &mut Cooldown {
        &mut self.cooldown
    }

    async fn logic(&mut self, ctx: &AgentContext) -> Result<()> {
        let ledger = ctx.require_ledger()?;
        let Some(entry) = ledger.fetch_inbox().await? else {
            return Ok(());
        };
        let id = entry.id;
        ctx.process_message(&entry.into_message()).await;
        ledger.acknowledge_message(id).await?;
        debug!(id, "acknowledged contract message");
        Ok(())
    }
}

// ── Outbox ─────────────────────────────────────────────────────

/// Pushes queued messages to the peer.
pub struct FlushOutbox {
    cooldown: Cooldown,
}

impl FlushOutbox {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown: Cooldown::from_secs(cooldown_secs),
        }
    }
}

#[async_trait]
impl Behaviour for FlushOutbox {
    fn name(&self) -> &str {
        "flush_outbox"
    }

    fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn cooldown_mut(&mut self) -> &mut Cooldown {
        &mut self.cooldown
    }

    async fn logic(&mut self, ctx: &AgentContext) -> Result<()> {
        let report = ctx.transport().flush_outbox().await;
        if report.delivered > 0 || report.failed {
            debug!(
                delivered = report.delivered,
                pending = report.pending,
                failed = report.failed,
                "outbox flushed"
            );
        }
        Ok(())
    }
}
