//! # sagent-runtime
//!
//! The agent itself. An [`Agent`] owns an ordered list of [`Behaviour`]s that
//! a cooperative scheduler runs on every tick, an ordered chain of
//! [`Handler`]s that every received message passes through, one transport and
//! an optional ledger.
//!
//! ```text
//! peer ──► Transport ──► received queue ──► DrainInbox ──► handlers
//! handlers / RandomMessage ──► outbox ──► FlushOutbox ──► Transport ──► peer
//! ```

pub mod agent;
pub mod behaviour;
pub mod behaviours;
pub mod context;
pub mod handler;
pub mod handlers;

pub use agent::Agent;
pub use behaviour::{Behaviour, Cooldown};
pub use behaviours::{
    CheckBalance, ContractInbox, Delivery, DiscoverPeers, DrainInbox, FlushOutbox, RandomMessage,
    VOCABULARY,
};
pub use context::AgentContext;
pub use handler::Handler;
pub use handlers::{CryptoHandler, KeywordHandler};
