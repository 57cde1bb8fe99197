//! # sagent-chain
//!
//! The blockchain side of an agent, behind the [`Ledger`] trait:
//! token balance and transfers, the agent's smart-agent contract inbox, and
//! peer discovery through the smart-agent factory.
//!
//! - [`EthLedger`] talks to an Ethereum JSON-RPC endpoint through `ethers`.
//! - [`MemoryChain`] / [`MemoryLedger`] keep everything in process, for tests
//!   and offline runs.

pub mod eth;
pub mod ledger;
pub mod memory;

pub use eth::EthLedger;
pub use ledger::{Balance, InboxEntry, Ledger, TxHandle};
pub use memory::{MemoryChain, MemoryLedger, Transfer};
