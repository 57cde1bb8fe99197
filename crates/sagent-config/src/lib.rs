//! # sagent-config
//!
//! Configuration for the sagent runtime. Reads `sagent.toml`, then applies
//! environment variable overrides; the CLI applies its flags on top.
//!
//! The resulting [`SagentConfig`] is built once at startup and handed to the
//! transport and agent constructors. There is no process-wide config state.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    BehavioursConfig, ChainConfig, ConfigWarning, LoggingConfig, MessagingMode, NodeConfig,
    PeerConfig, SagentConfig, SchedulerConfig, TransportConfig, TransportMode, WarningSeverity,
};
