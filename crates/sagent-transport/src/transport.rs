use async_trait::async_trait;
use sagent_core::{Message, MessageQueue, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Outcome of one outbox flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages handed to the peer during this flush.
    pub delivered: usize,
    /// Messages still queued afterwards.
    pub pending: usize,
    /// Whether the flush stopped on a delivery failure.
    pub failed: bool,
}

/// Queues and connection flag shared between a transport's background tasks
/// and the agent scheduler.
#[derive(Debug)]
pub struct TransportState {
    local_addr: String,
    peer_addr: Option<String>,
    received: MessageQueue,
    sent: MessageQueue,
    connected: AtomicBool,
}

impl TransportState {
    pub fn new(local_addr: impl Into<String>, peer_addr: Option<String>) -> Self {
        Self {
            local_addr: local_addr.into(),
            peer_addr,
            received: MessageQueue::new(),
            sent: MessageQueue::new(),
            connected: AtomicBool::new(false),
        }
    }

    /// `host:port` this transport listens on.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    pub fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }

    /// Inbound messages waiting for the agent.
    pub fn received(&self) -> &MessageQueue {
        &self.received
    }

    /// Outbound messages waiting for a flush.
    pub fn sent(&self) -> &MessageQueue {
        &self.sent
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

/// A duplex link to the agent's peer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs ("socket", "http").
    fn kind(&self) -> &'static str;

    fn state(&self) -> &TransportState;

    /// Queue a message for the next flush. Never fails.
    fn send_to_outbox(&self, message: Message) {
        self.state().sent().push(message);
    }

    fn received(&self) -> &MessageQueue {
        self.state().received()
    }

    fn outbox(&self) -> &MessageQueue {
        self.state().sent()
    }

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Hand one message to the peer.
    async fn deliver(&self, message: &Message) -> Result<()>;

    /// Deliver queued messages in order until the outbox is empty or a
    /// delivery fails. Never returns an error.
    async fn flush_outbox(&self) -> FlushReport {
        flush_queue(self).await
    }

    /// Serve the inbound side (and the outbound connector where there is
    /// one). Only returns on a fatal error such as a failed bind.
    async fn run(&self) -> Result<()>;
}

/// Pop and deliver outbox messages one at a time.
///
/// On the first failure the message goes back to the front of the outbox,
/// the transport is marked disconnected and the flush stops.
pub async fn flush_queue<T: Transport + ?Sized>(transport: &T) -> FlushReport {
    let state = transport.state();
    let mut report = FlushReport::default();

    while let Some(message) = state.sent().pop() {
        match transport.deliver(&message).await {
            Ok(()) => {
                debug!(id = message.id(), "delivered message");
                report.delivered += 1;
            }
            Err(e) => {
                warn!(
                    transport = transport.kind(),
                    id = message.id(),
                    error = %e,
                    "delivery failed, keeping message queued"
                );
                state.set_connected(false);
                state.sent().push_front(message);
                report.failed = true;
                break;
            }
        }
    }

    report.pending = state.sent().len();
    report
}
