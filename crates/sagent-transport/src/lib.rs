//! # sagent-transport
//!
//! Moves [`Message`](sagent_core::Message)s between an agent and its single
//! peer. Every transport owns a [`TransportState`]: the received queue the
//! agent drains, the outbox it fills, and an advisory connected flag.
//!
//! - [`SocketTransport`]: persistent TCP connection, one JSON object per line.
//! - [`HttpTransport`]: one `POST /` per message.

pub mod codec;
pub mod http;
pub mod socket;
pub mod transport;

use sagent_config::{SagentConfig, TransportMode};
use std::sync::Arc;

pub use http::HttpTransport;
pub use socket::SocketTransport;
pub use transport::{FlushReport, Transport, TransportState, flush_queue};

/// Build the transport selected by `transport.mode`.
pub fn build_transport(config: &SagentConfig) -> sagent_core::Result<Arc<dyn Transport>> {
    let local = config.node.bind_addr()?;
    let peer = config.peer.address();
    let transport: Arc<dyn Transport> = match config.transport.mode {
        TransportMode::Socket => Arc::new(SocketTransport::new(local, peer, &config.transport)),
        TransportMode::Http => Arc::new(HttpTransport::new(local, peer, &config.transport)?),
    };
    Ok(transport)
}
