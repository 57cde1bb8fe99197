//! Request/response transport: every message is one `POST /`.

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    routing::post,
};
use sagent_config::TransportConfig;
use sagent_core::{Message, Result, SagentError};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{Instrument, Span, debug, info, warn};
use url::Url;

use crate::codec::decode_frame;
use crate::transport::{FlushReport, Transport, TransportState, flush_queue};

pub struct HttpTransport {
    state: Arc<TransportState>,
    client: reqwest::Client,
    peer_url: Option<Url>,
}

impl HttpTransport {
    pub fn new(
        local_addr: impl Into<String>,
        peer_addr: Option<String>,
        config: &TransportConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| SagentError::Transport(format!("failed to build HTTP client: {e}")))?;

        let peer_url = peer_addr
            .as_deref()
            .map(|peer| {
                Url::parse(&format!("http://{peer}/"))
                    .map_err(|e| SagentError::InvalidAddress(format!("{peer}: {e}")))
            })
            .transpose()?;

        Ok(Self {
            state: Arc::new(TransportState::new(local_addr, peer_addr)),
            client,
            peer_url,
        })
    }
}

/// Inbound side: `POST /` with one JSON message as the body.
pub fn router(state: Arc<TransportState>) -> Router {
    Router::new()
        .route("/", post(receive_handler))
        .with_state(state)
}

/// Run every request inside `span`. axum serves each connection on a fresh
/// task, which starts outside the span `run` was called in.
fn in_span(router: Router, span: Span) -> Router {
    router.layer(middleware::from_fn(move |req: Request, next: Next| {
        let span = span.clone();
        async move { next.run(req).instrument(span).await }
    }))
}

async fn receive_handler(
    State(state): State<Arc<TransportState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> (StatusCode, String) {
    match decode_frame(&body, &remote.to_string()) {
        Ok(message) => {
            debug!(remote = %remote, %message, "received message");
            state.received().push(message);
            (StatusCode::OK, "ok".into())
        }
        Err(e) => {
            warn!(remote = %remote, error = %e, "rejecting malformed message");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn state(&self) -> &TransportState {
        &self.state
    }

    async fn deliver(&self, message: &Message) -> Result<()> {
        let Some(ref url) = self.peer_url else {
            return Err(SagentError::PeerUnreachable("no peer configured".into()));
        };
        let resp = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(message.to_json()?)
            .send()
            .await
            .map_err(|e| SagentError::Delivery {
                peer: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(SagentError::Delivery {
                peer: url.to_string(),
                reason: format!("peer answered {status}"),
            });
        }
        self.state.set_connected(true);
        Ok(())
    }

    async fn flush_outbox(&self) -> FlushReport {
        if self.peer_url.is_none() {
            return FlushReport {
                pending: self.state.sent().len(),
                ..Default::default()
            };
        }
        flush_queue(self).await
    }

    async fn run(&self) -> Result<()> {
        let local = self.state.local_addr().to_string();
        let listener = tokio::net::TcpListener::bind(&local)
            .await
            .map_err(|e| SagentError::Bind {
                addr: local.clone(),
                reason: e.to_string(),
            })?;
        info!(listen = %local, "http transport listening");

        let app = in_span(router(Arc::clone(&self.state)), Span::current());
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| SagentError::Transport(format!("http server error: {e}")))?;

        Ok(())
    }
}
