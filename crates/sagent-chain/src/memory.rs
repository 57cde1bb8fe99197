//! In-process ledger for deterministic testing and offline runs.
//!
//! A [`MemoryChain`] is the shared world: token balances, the factory
//! registry and every smart-agent inbox. Each agent gets its own
//! [`MemoryLedger`] view through [`MemoryChain::ledger`].

use async_trait::async_trait;
use parking_lot::Mutex;
use sagent_core::{Result, SagentError};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ledger::{Balance, InboxEntry, Ledger, TxHandle};

/// A completed token transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    /// Amount in the token's smallest unit.
    pub raw: u128,
}

#[derive(Debug, Default)]
struct ChainState {
    balances: HashMap<String, u128>,
    registry: Vec<String>,
    inboxes: HashMap<String, VecDeque<InboxEntry>>,
    next_entry_id: u64,
    next_tx: u64,
    transfers: Vec<Transfer>,
    acks: Vec<(String, u64)>,
}

impl ChainState {
    fn tx(&mut self) -> TxHandle {
        self.next_tx += 1;
        TxHandle(format!("0x{:064x}", self.next_tx))
    }
}

/// Shared in-memory chain.
#[derive(Clone)]
pub struct MemoryChain {
    state: Arc<Mutex<ChainState>>,
    decimals: u8,
    failing: Arc<AtomicBool>,
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new(18)
    }
}

impl MemoryChain {
    pub fn new(decimals: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState::default())),
            decimals,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register `address` with the factory and return its ledger view.
    pub fn ledger(&self, address: impl Into<String>) -> MemoryLedger {
        let address = address.into();
        {
            let mut state = self.state.lock();
            if !state.registry.contains(&address) {
                state.registry.push(address.clone());
            }
        }
        MemoryLedger {
            chain: self.clone(),
            address,
        }
    }

    fn unit(&self) -> u128 {
        10u128.pow(u32::from(self.decimals))
    }

    /// Credit `whole` tokens to `address`.
    pub fn mint(&self, address: &str, whole: u64) {
        let raw = u128::from(whole) * self.unit();
        *self.state.lock().balances.entry(address.to_string()).or_default() += raw;
    }

    pub fn balance_of(&self, address: &str) -> Balance {
        let raw = self.state.lock().balances.get(address).copied().unwrap_or(0);
        Balance::new(raw, self.decimals)
    }

    /// Make every ledger call fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.state.lock().transfers.clone()
    }

    /// `(owner, entry id)` of every acknowledged inbox entry.
    pub fn acknowledgements(&self) -> Vec<(String, u64)> {
        self.state.lock().acks.clone()
    }

    /// Pending entries in `address`'s inbox, oldest first.
    pub fn inbox(&self, address: &str) -> Vec<InboxEntry> {
        self.state
            .lock()
            .inboxes
            .get(address)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SagentError::Chain("injected failure".into()));
        }
        Ok(())
    }
}

/// One agent's view of a [`MemoryChain`].
#[derive(Clone)]
pub struct MemoryLedger {
    chain: MemoryChain,
    address: String,
}

impl MemoryLedger {
    pub fn chain(&self) -> &MemoryChain {
        &self.chain
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    fn address(&self) -> &str {
        &self.address
    }

    async fn check_balance(&self) -> Result<Balance> {
        self.chain.check()?;
        Ok(self.chain.balance_of(&self.address))
    }

    async fn send_token(&self, to: &str, amount: u64) -> Result<bool> {
        self.chain.check()?;
        let raw = u128::from(amount) * self.chain.unit();
        let mut state = self.chain.state.lock();
        let available = state.balances.get(&self.address).copied().unwrap_or(0);
        if available < raw {
            // Mirrors a mined-but-reverted ERC-20 transfer.
            return Ok(false);
        }
        state.balances.insert(self.address.clone(), available - raw);
        *state.balances.entry(to.to_string()).or_default() += raw;
        state.transfers.push(Transfer {
            from: self.address.clone(),
            to: to.to_string(),
            raw,
        });
        Ok(true)
    }

    async fn send_contract_message(
        &self,
        sender: &str,
        receiver: &str,
        text: &str,
    ) -> Result<TxHandle> {
        self.chain.check()?;
        let mut state = self.chain.state.lock();
        if !state.registry.iter().any(|a| a == receiver) {
            return Err(SagentError::InvalidAddress(format!(
                "{receiver} is not a registered smart agent"
            )));
        }
        let id = state.next_entry_id;
        state.next_entry_id += 1;
        state
            .inboxes
            .entry(receiver.to_string())
            .or_default()
            .push_back(InboxEntry {
                id,
                text: text.to_string(),
                sender: sender.to_string(),
            });
        Ok(state.tx())
    }

    async fn fetch_inbox(&self) -> Result<Option<InboxEntry>> {
        self.chain.check()?;
        let state = self.chain.state.lock();
        Ok(state
            .inboxes
            .get(&self.address)
            .and_then(|q| q.front().cloned()))
    }

    async fn acknowledge_message(&self, id: u64) -> Result<()> {
        self.chain.check()?;
        let mut state = self.chain.state.lock();
        let removed = state
            .inboxes
            .get_mut(&self.address)
            .and_then(|q| q.iter().position(|e| e.id == id).and_then(|i| q.remove(i)));
        match removed {
            Some(_) => {
                state.acks.push((self.address.clone(), id));
                Ok(())
            }
            None => Err(SagentError::Chain(format!("no inbox entry {id} to acknowledge"))),
        }
    }

    async fn discover_peers(&self) -> Result<Vec<String>> {
        self.chain.check()?;
        Ok(self.chain.state.lock().registry.clone())
    }
}
