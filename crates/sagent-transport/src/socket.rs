//! Persistent TCP transport.
//!
//! Inbound: an accept loop with one reader task per connection. Outbound: a
//! connector task that keeps a single stream to the peer open, retrying on a
//! fixed backoff and reconnecting whenever a flush hits a write failure.

use async_trait::async_trait;
use sagent_config::TransportConfig;
use sagent_core::{Message, Result, SagentError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::codec::{FRAME_DELIMITER, decode_frame, encode_frame, is_blank};
use crate::transport::{FlushReport, Transport, TransportState, flush_queue};

pub struct SocketTransport {
    state: Arc<TransportState>,
    writer: Arc<Mutex<Option<TcpStream>>>,
    reconnect: Arc<Notify>,
    connect_attempts: Arc<AtomicU64>,
    connect_timeout: Duration,
    send_timeout: Duration,
    reconnect_backoff: Duration,
}

impl SocketTransport {
    pub fn new(
        local_addr: impl Into<String>,
        peer_addr: Option<String>,
        config: &TransportConfig,
    ) -> Self {
        Self {
            state: Arc::new(TransportState::new(local_addr, peer_addr)),
            writer: Arc::new(Mutex::new(None)),
            reconnect: Arc::new(Notify::new()),
            connect_attempts: Arc::new(AtomicU64::new(0)),
            connect_timeout: config.connect_timeout(),
            send_timeout: config.send_timeout(),
            reconnect_backoff: config.reconnect_backoff(),
        }
    }

    /// Outbound connect attempts made so far.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    fn spawn_connector(&self, peer: String) -> JoinHandle<()> {
        let connector = Connector {
            peer,
            state: Arc::clone(&self.state),
            writer: Arc::clone(&self.writer),
            reconnect: Arc::clone(&self.reconnect),
            attempts: Arc::clone(&self.connect_attempts),
            connect_timeout: self.connect_timeout,
            backoff: self.reconnect_backoff,
        };
        tokio::spawn(connector.run().in_current_span())
    }

    /// Drop the outbound stream and wake the connector.
    async fn drop_stream(&self) {
        self.writer.lock().await.take();
        self.state.set_connected(false);
        self.reconnect.notify_one();
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn kind(&self) -> &'static str {
        "socket"
    }

    fn state(&self) -> &TransportState {
        &self.state
    }

    async fn deliver(&self, message: &Message) -> Result<()> {
        let peer = self.state.peer_addr().unwrap_or("peer").to_string();
        let frame = encode_frame(message)?;

        let outcome = {
            let mut guard = self.writer.lock().await;
            let Some(stream) = guard.as_mut() else {
                return Err(SagentError::PeerUnreachable(peer));
            };
            tokio::time::timeout(self.send_timeout, stream.write_all(&frame)).await
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.drop_stream().await;
                Err(SagentError::Delivery {
                    peer,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                self.drop_stream().await;
                Err(SagentError::Timeout {
                    operation: format!("write to {peer}"),
                    secs: self.send_timeout.as_secs(),
                })
            }
        }
    }

    async fn flush_outbox(&self) -> FlushReport {
        if self.writer.lock().await.is_none() {
            let pending = self.state.sent().len();
            if pending > 0 {
                debug!(pending, "not connected to peer, leaving outbox queued");
            }
            return FlushReport {
                pending,
                ..Default::default()
            };
        }
        flush_queue(self).await
    }

    async fn run(&self) -> Result<()> {
        let local = self.state.local_addr().to_string();
        let listener = TcpListener::bind(&local)
            .await
            .map_err(|e| SagentError::Bind {
                addr: local.clone(),
                reason: e.to_string(),
            })?;
        info!(listen = %local, "socket transport listening");

        let _connector = self
            .state
            .peer_addr()
            .map(|peer| AbortOnDrop(self.spawn_connector(peer.to_string())));

        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    debug!(remote = %remote, "accepted connection");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(read_frames(stream, remote.to_string(), state).in_current_span());
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Aborts the wrapped task when `run` returns or is cancelled.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Connector {
    peer: String,
    state: Arc<TransportState>,
    writer: Arc<Mutex<Option<TcpStream>>>,
    reconnect: Arc<Notify>,
    attempts: Arc<AtomicU64>,
    connect_timeout: Duration,
    backoff: Duration,
}

impl Connector {
    async fn run(self) {
        loop {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.peer)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "could not set TCP_NODELAY");
                    }
                    *self.writer.lock().await = Some(stream);
                    self.state.set_connected(true);
                    info!(peer = %self.peer, "connected to peer");

                    // Parked until a flush reports a broken stream.
                    self.reconnect.notified().await;
                    info!(peer = %self.peer, "connection to peer lost, reconnecting");
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(
                        peer = %self.peer,
                        error = %e,
                        retry_in_secs = self.backoff.as_secs(),
                        "could not connect to peer"
                    );
                }
                Err(_) => {
                    warn!(
                        peer = %self.peer,
                        timeout_secs = self.connect_timeout.as_secs(),
                        retry_in_secs = self.backoff.as_secs(),
                        "connect to peer timed out"
                    );
                }
            }
            self.state.set_connected(false);
            tokio::time::sleep(self.backoff).await;
        }
    }
}

/// Read `\n`-delimited frames until EOF or a read error.
async fn read_frames(stream: TcpStream, remote: String, state: Arc<TransportState>) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(FRAME_DELIMITER, &mut line).await {
            Ok(0) => {
                debug!(remote = %remote, "connection closed");
                break;
            }
            Ok(_) => {
                if is_blank(&line) {
                    continue;
                }
                match decode_frame(&line, &remote) {
                    Ok(message) => {
                        debug!(remote = %remote, %message, "received message");
                        state.received().push(message);
                    }
                    Err(e) => {
                        warn!(remote = %remote, error = %e, "dropping malformed frame");
                    }
                }
            }
            Err(e) => {
                warn!(remote = %remote, error = %e, "read failed, closing connection");
                break;
            }
        }
    }
}
