//! # sagent-core
//!
//! Core types for the sagent agent runtime: the [`Message`] exchanged between
//! peers, the concurrency-safe [`MessageQueue`] backing the inbox and outbox,
//! and the shared error type.

pub mod error;
pub mod message;
pub mod queue;

pub use error::{Result, SagentError};
pub use message::Message;
pub use queue::MessageQueue;
