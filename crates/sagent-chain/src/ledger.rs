use async_trait::async_trait;
use sagent_core::{Message, Result};

/// A token balance as stored on chain: an integer amount in the token's
/// smallest unit plus the token's decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub raw: u128,
    pub decimals: u8,
}

impl Balance {
    pub fn new(raw: u128, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Human-readable amount (`raw / 10^decimals`).
    pub fn amount(&self) -> f64 {
        self.raw as f64 / 10f64.powi(i32::from(self.decimals))
    }
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.amount())
    }
}

/// Hash of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle(pub String);

impl std::fmt::Display for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The pending entry at the head of a smart-agent contract inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    /// Slot id to pass back to [`Ledger::acknowledge_message`].
    pub id: u64,
    pub text: String,
    pub sender: String,
}

impl InboxEntry {
    /// Turn the entry into a runtime message addressed from its sender.
    pub fn into_message(self) -> Message {
        Message::new(self.id, self.text).with_sender(self.sender)
    }
}

/// What an agent can do on chain.
///
/// Addresses are passed around as strings; each implementation decides how
/// to parse and validate them.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// The agent's on-chain identity (its smart-agent contract).
    fn address(&self) -> &str;

    /// Token balance held by [`Ledger::address`].
    async fn check_balance(&self) -> Result<Balance>;

    /// Transfer `amount` whole tokens to `to`. `Ok(false)` means the
    /// transaction was mined but reverted.
    async fn send_token(&self, to: &str, amount: u64) -> Result<bool>;

    /// Write `text` into `receiver`'s contract inbox, attributed to `sender`.
    async fn send_contract_message(
        &self,
        sender: &str,
        receiver: &str,
        text: &str,
    ) -> Result<TxHandle>;

    /// Read the head of our own contract inbox, if any.
    async fn fetch_inbox(&self) -> Result<Option<InboxEntry>>;

    /// Remove the inbox entry with `id`.
    async fn acknowledge_message(&self, id: u64) -> Result<()>;

    /// Every smart agent registered with the factory, ourselves included.
    async fn discover_peers(&self) -> Result<Vec<String>>;
}
