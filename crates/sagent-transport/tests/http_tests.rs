//! HTTP transport tests: the inbound router via `oneshot`, outbound flushes
//! against a local fake peer.

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use http_body_util::BodyExt;
use sagent_config::TransportConfig;
use sagent_core::Message;
use sagent_transport::http::router;
use sagent_transport::{HttpTransport, Transport, TransportState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tower::ServiceExt;

fn test_router(state: Arc<TransportState>) -> axum::Router {
    let remote: SocketAddr = "10.1.2.3:40000".parse().unwrap();
    router(state).layer(MockConnectInfo(remote))
}

fn post_body(body: &'static str) -> Request<Body> {
    Request::post("/")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A fake peer that records bodies and answers 500 on the `fail_on`th request.
async fn spawn_peer(fail_on: Option<usize>) -> (String, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let count = Arc::new(AtomicUsize::new(0));

    let app = {
        let seen = Arc::clone(&seen);
        axum::Router::new().route(
            "/",
            post(move |body: String| {
                let seen = Arc::clone(&seen);
                let count = Arc::clone(&count);
                async move {
                    let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                    if Some(n) == fail_on {
                        return StatusCode::INTERNAL_SERVER_ERROR;
                    }
                    seen.lock().await.push(body);
                    StatusCode::OK
                }
            }),
        )
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

// ── Inbound ────────────────────────────────────────────────────

#[tokio::test]
async fn test_post_valid_message_is_queued() {
    let state = Arc::new(TransportState::new("127.0.0.1:0", None));
    let app = test_router(Arc::clone(&state));

    let resp = app
        .oneshot(post_body(r#"{"id": 1, "message": "hello sun"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let msg = state.received().pop().unwrap();
    assert_eq!(msg.id(), 1);
    assert_eq!(msg.text(), "hello sun");
    assert_eq!(msg.sender(), Some("10.1.2.3:40000"));
}

#[tokio::test]
async fn test_post_keeps_explicit_sender() {
    let state = Arc::new(TransportState::new("127.0.0.1:0", None));
    let app = test_router(Arc::clone(&state));

    let resp = app
        .oneshot(post_body(r#"{"id": 9, "message": "sky", "sender": "agent-b"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(state.received().pop().unwrap().sender(), Some("agent-b"));
}

#[tokio::test]
async fn test_post_non_json_is_500_and_nothing_queued() {
    let state = Arc::new(TransportState::new("127.0.0.1:0", None));
    let app = test_router(Arc::clone(&state));

    let resp = app.oneshot(post_body("definitely not json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(resp).await.contains("malformed message"));
    assert!(state.received().is_empty());
}

#[tokio::test]
async fn test_get_is_not_allowed() {
    let state = Arc::new(TransportState::new("127.0.0.1:0", None));
    let app = test_router(state);

    let resp = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

/// Log sink shared with a test subscriber.
#[derive(Clone, Default)]
struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn test_request_logs_stay_in_the_agent_span() {
    use tracing::Instrument;

    let logs = Captured::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let local = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .to_string();
    let transport = Arc::new(
        HttpTransport::new(local.clone(), None, &TransportConfig::default()).unwrap(),
    );
    let server = Arc::clone(&transport);
    let span = tracing::info_span!("agent", addr = %local);
    tokio::spawn(async move { server.run().await }.instrument(span));

    let client = reqwest::Client::new();
    let mut status = None;
    for _ in 0..50 {
        match client
            .post(format!("http://{local}/"))
            .body("not json")
            .send()
            .await
        {
            Ok(resp) => {
                status = Some(resp.status());
                break;
            }
            Err(_) => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
        }
    }
    assert_eq!(status, Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));

    let line = logs
        .text()
        .lines()
        .find(|l| l.contains("rejecting malformed message"))
        .map(str::to_string)
        .expect("rejection was logged");
    assert!(line.contains(&format!("agent{{addr={local}}}")), "{line}");
}

// ── Outbound ───────────────────────────────────────────────────

#[tokio::test]
async fn test_flush_delivers_all_in_order() {
    let (peer, seen) = spawn_peer(None).await;
    let transport =
        HttpTransport::new("127.0.0.1:0", Some(peer), &TransportConfig::default()).unwrap();

    for id in 1..=4 {
        transport.send_to_outbox(Message::new(id, format!("msg {id}")));
    }
    let report = transport.flush_outbox().await;

    assert_eq!(report.delivered, 4);
    assert_eq!(report.pending, 0);
    assert!(!report.failed);
    assert!(transport.outbox().is_empty());
    assert!(transport.is_connected());

    let ids: Vec<u64> = seen
        .lock()
        .await
        .iter()
        .map(|b| Message::from_json(b.as_bytes()).unwrap().id())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_flush_stops_on_failure_and_requeues_at_front() {
    let (peer, seen) = spawn_peer(Some(3)).await;
    let transport =
        HttpTransport::new("127.0.0.1:0", Some(peer), &TransportConfig::default()).unwrap();

    for id in 1..=5 {
        transport.send_to_outbox(Message::new(id, "crypto"));
    }
    let report = transport.flush_outbox().await;

    assert_eq!(report.delivered, 2);
    assert!(report.failed);
    assert_eq!(report.pending, 3);
    assert!(!transport.is_connected());
    assert_eq!(seen.lock().await.len(), 2);

    let remaining: Vec<u64> = transport.outbox().snapshot().iter().map(|m| m.id()).collect();
    assert_eq!(remaining, vec![3, 4, 5]);

    // The peer recovers; the next flush picks up where the last one stopped.
    let report = transport.flush_outbox().await;
    assert_eq!(report.delivered, 3);
    assert_eq!(report.pending, 0);
    assert!(transport.is_connected());
}

#[tokio::test]
async fn test_flush_to_unreachable_peer_keeps_outbox() {
    // Bind then drop to get a port nobody listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .to_string();
    let transport =
        HttpTransport::new("127.0.0.1:0", Some(addr), &TransportConfig::default()).unwrap();

    transport.send_to_outbox(Message::new(1, "moon"));
    let report = transport.flush_outbox().await;

    assert!(report.failed);
    assert_eq!(report.delivered, 0);
    assert_eq!(transport.outbox().len(), 1);
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_flush_without_peer_is_a_no_op() {
    let transport = HttpTransport::new("127.0.0.1:0", None, &TransportConfig::default()).unwrap();
    transport.send_to_outbox(Message::new(1, "ocean"));

    let report = transport.flush_outbox().await;
    assert_eq!(report.delivered, 0);
    assert_eq!(report.pending, 1);
    assert!(!report.failed);
}
