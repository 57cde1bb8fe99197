use thiserror::Error;

/// Unified error type for the sagent runtime.
#[derive(Error, Debug)]
pub enum SagentError {
    // ── Transport errors ───────────────────────────────────────
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("delivery to {peer} failed: {reason}")]
    Delivery { peer: String, reason: String },

    #[error("timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    // ── Codec errors ───────────────────────────────────────────
    #[error("malformed message: {0}")]
    Decode(String),

    // ── Chain errors ───────────────────────────────────────────
    #[error("chain error: {0}")]
    Chain(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    // ── Runtime errors ─────────────────────────────────────────
    #[error("behaviour {behaviour} failed: {reason}")]
    Behaviour { behaviour: String, reason: String },

    #[error("handler {handler} failed: {reason}")]
    Handler { handler: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SagentError>;
