//! Scheduler, dispatch and built-in behaviour tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use sagent_chain::{Ledger, MemoryChain};
use sagent_config::{MessagingMode, SagentConfig, TransportConfig};
use sagent_core::{Message, Result, SagentError};
use sagent_runtime::*;
use sagent_transport::{SocketTransport, Transport, TransportState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

// ── Test doubles ───────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Mode {
    Succeed,
    Fail,
    Panic,
}

struct Scripted {
    name: &'static str,
    cooldown: Cooldown,
    calls: Arc<AtomicUsize>,
    mode: Mode,
}

impl Scripted {
    fn new(name: &'static str, secs: u64, mode: Mode) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let scripted = Self {
            name,
            cooldown: Cooldown::from_secs(secs),
            calls: Arc::clone(&calls),
            mode,
        };
        (scripted, calls)
    }
}

#[async_trait]
impl Behaviour for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn cooldown_mut(&mut self) -> &mut Cooldown {
        &mut self.cooldown
    }

    async fn logic(&mut self, _ctx: &AgentContext) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Succeed => Ok(()),
            Mode::Fail => Err(SagentError::Behaviour {
                behaviour: self.name.into(),
                reason: "boom".into(),
            }),
            Mode::Panic => panic!("scripted panicked"),
        }
    }
}

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: &'static str,
    log: Log,
    mode: Mode,
    claim: bool,
}

#[async_trait]
impl Handler for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    async fn handle(&self, message: &Message, _ctx: &AgentContext) -> Result<bool> {
        self.log.lock().push(format!("{}:{}", self.name, message.id()));
        match self.mode {
            Mode::Succeed => Ok(self.claim),
            Mode::Fail => Err(SagentError::Handler {
                handler: self.name.into(),
                reason: "nope".into(),
            }),
            Mode::Panic => panic!("recorder panicked"),
        }
    }
}

/// Collects every message it sees.
struct Inbox(Arc<Mutex<Vec<Message>>>);

#[async_trait]
impl Handler for Inbox {
    fn name(&self) -> &str {
        "inbox"
    }

    async fn handle(&self, message: &Message, _ctx: &AgentContext) -> Result<bool> {
        self.0.lock().push(message.clone());
        Ok(true)
    }
}

/// Transport whose peer accepts `accept` messages and then refuses.
struct FlakyTransport {
    state: TransportState,
    accept: usize,
    delivered: Mutex<Vec<u64>>,
}

#[async_trait]
impl Transport for FlakyTransport {
    fn kind(&self) -> &'static str {
        "flaky"
    }

    fn state(&self) -> &TransportState {
        &self.state
    }

    async fn deliver(&self, message: &Message) -> Result<()> {
        let mut delivered = self.delivered.lock();
        if delivered.len() >= self.accept {
            return Err(SagentError::PeerUnreachable("flaky".into()));
        }
        delivered.push(message.id());
        self.state.set_connected(true);
        Ok(())
    }

    async fn run(&self) -> Result<()> {
        std::future::pending().await
    }
}

fn idle_transport() -> Arc<dyn Transport> {
    Arc::new(SocketTransport::new(
        "127.0.0.1:0",
        None,
        &TransportConfig::default(),
    ))
}

fn agent(ledger: Option<Arc<dyn Ledger>>) -> Agent {
    Agent::new(&SagentConfig::default(), idle_transport(), ledger)
}

// ── Behaviour contract ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_guard_skip_does_not_run_or_touch_timer() {
    let ctx = AgentContext::new(idle_transport(), None);
    let (mut scripted, calls) = Scripted::new("scripted", 1, Mode::Succeed);
    let before = scripted.cooldown().last_run_at();

    assert!(!scripted.run(&ctx).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(scripted.cooldown().last_run_at(), before);
}

#[tokio::test(start_paused = true)]
async fn test_successful_run_restarts_cooldown() {
    let ctx = AgentContext::new(idle_transport(), None);
    let (mut scripted, calls) = Scripted::new("scripted", 1, Mode::Succeed);

    tokio::time::advance(Duration::from_secs(1)).await;
    let called_at = Instant::now();
    assert!(scripted.run(&ctx).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(scripted.cooldown().last_run_at() >= called_at);
    assert!(!scripted.guard());
}

#[tokio::test(start_paused = true)]
async fn test_failed_logic_keeps_behaviour_due() {
    let mut agent = agent(None);
    let (scripted, calls) = Scripted::new("failing", 1, Mode::Fail);
    agent.register_behaviour(scripted);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(agent.tick().await, 0);
    assert_eq!(agent.tick().await, 0);
    // Not marked as run, so it was retried on the very next tick.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tick_survives_panicking_behaviour() {
    let mut agent = agent(None);
    let (bad, bad_calls) = Scripted::new("bad", 1, Mode::Panic);
    let (good, good_calls) = Scripted::new("good", 1, Mode::Succeed);
    agent.register_behaviour(bad);
    agent.register_behaviour(good);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(agent.tick().await, 1);
    assert_eq!(bad_calls.load(Ordering::SeqCst), 1);
    assert_eq!(good_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_behaviours_follow_their_own_cooldowns() {
    let mut agent = agent(None);
    let (fast, fast_calls) = Scripted::new("fast", 1, Mode::Succeed);
    let (slow, slow_calls) = Scripted::new("slow", 3, Mode::Succeed);
    agent.register_behaviour(fast);
    agent.register_behaviour(slow);

    for _ in 0..6 {
        tokio::time::advance(Duration::from_millis(500)).await;
        agent.tick().await;
    }
    assert_eq!(fast_calls.load(Ordering::SeqCst), 3);
    assert_eq!(slow_calls.load(Ordering::SeqCst), 1);
}

// ── Handler dispatch ───────────────────────────────────────────

#[tokio::test]
async fn test_every_handler_sees_every_message_in_order() {
    let log: Log = Arc::default();
    let mut agent = agent(None);
    for (name, mode, claim) in [
        ("first", Mode::Succeed, true),
        ("second", Mode::Fail, false),
        ("third", Mode::Panic, false),
        ("fourth", Mode::Succeed, false),
        ("fifth", Mode::Succeed, true),
    ] {
        agent.register_handler(Recorder {
            name,
            log: Arc::clone(&log),
            mode,
            claim,
        });
    }

    assert_eq!(agent.process_message(&Message::new(1, "a")).await, 2);
    assert_eq!(agent.process_message(&Message::new(2, "b")).await, 2);

    assert_eq!(
        *log.lock(),
        vec![
            "first:1", "second:1", "third:1", "fourth:1", "fifth:1", "first:2", "second:2",
            "third:2", "fourth:2", "fifth:2",
        ]
    );
}

#[tokio::test]
async fn test_keyword_handler_is_case_insensitive() {
    let ctx = AgentContext::new(idle_transport(), None);
    let hello = KeywordHandler::hello();
    assert!(hello.handle(&Message::new(1, "HELLO moon"), &ctx).await.unwrap());
    assert!(!hello.handle(&Message::new(2, "sun sky"), &ctx).await.unwrap());
}

// ── Built-in behaviours ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_drain_inbox_dispatches_in_fifo_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut agent = agent(None);
    agent.register_behaviour(DrainInbox::new(1));
    agent.register_handler(Inbox(Arc::clone(&seen)));

    let received = agent.context().transport().received();
    for id in 1..=3 {
        received.push(Message::new(id, "x"));
    }

    tokio::time::advance(Duration::from_secs(1)).await;
    agent.tick().await;

    let ids: Vec<u64> = seen.lock().iter().map(|m| m.id()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(agent.context().transport().received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_random_message_ids_start_at_one() {
    let mut agent = agent(None);
    agent.register_behaviour(
        RandomMessage::new(2, Delivery::Outbox).with_words(|| "hello sun".to_string()),
    );

    tokio::time::advance(Duration::from_secs(2)).await;
    agent.tick().await;
    tokio::time::advance(Duration::from_secs(1)).await;
    agent.tick().await;
    tokio::time::advance(Duration::from_secs(1)).await;
    agent.tick().await;

    let outbox = agent.context().transport().outbox().snapshot();
    assert_eq!(outbox.len(), 2);
    assert_eq!(outbox[0], Message::new(1, "hello sun"));
    assert_eq!(outbox[1].id(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_random_messages_use_two_vocabulary_words() {
    let mut agent = agent(None);
    agent.register_behaviour(RandomMessage::new(1, Delivery::Outbox));

    for _ in 0..20 {
        tokio::time::advance(Duration::from_secs(1)).await;
        agent.tick().await;
    }

    let outbox = agent.context().transport().outbox().snapshot();
    assert_eq!(outbox.len(), 20);
    for (i, message) in outbox.iter().enumerate() {
        assert_eq!(message.id(), i as u64 + 1);
        let words: Vec<&str> = message.text().split(' ').collect();
        assert_eq!(words.len(), 2, "{message}");
        assert!(words.iter().all(|w| VOCABULARY.contains(w)), "{message}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_flush_outbox_stops_at_first_failure() {
    let transport = Arc::new(FlakyTransport {
        state: TransportState::new("127.0.0.1:0", Some("127.0.0.1:1".into())),
        accept: 2,
        delivered: Mutex::new(Vec::new()),
    });
    let mut agent = Agent::new(&SagentConfig::default(), transport.clone(), None);
    agent.register_behaviour(FlushOutbox::new(1));

    for id in 1..=5 {
        transport.send_to_outbox(Message::new(id, "m"));
    }
    tokio::time::advance(Duration::from_secs(1)).await;
    agent.tick().await;

    assert_eq!(*transport.delivered.lock(), vec![1, 2]);
    assert!(!transport.is_connected());
    let remaining: Vec<u64> = transport.outbox().snapshot().iter().map(|m| m.id()).collect();
    assert_eq!(remaining, vec![3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_check_balance_swallows_ledger_errors() {
    let chain = MemoryChain::default();
    chain.set_failing(true);
    let ledger: Arc<dyn Ledger> = Arc::new(chain.ledger("0xa"));
    let ctx = AgentContext::new(idle_transport(), Some(ledger));

    let mut check = CheckBalance::new(1);
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(check.run(&ctx).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_contract_messaging_round_trip() {
    let chain = MemoryChain::default();
    chain.mint("0xb", 10);
    let a_ledger: Arc<dyn Ledger> = Arc::new(chain.ledger("0xa"));
    let b_ledger: Arc<dyn Ledger> = Arc::new(chain.ledger("0xb"));

    let mut a = agent(Some(a_ledger));
    a.register_behaviour(DiscoverPeers::new(1));
    a.register_behaviour(
        RandomMessage::new(1, Delivery::Contract).with_words(|| "crypto moon".to_string()),
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut b = agent(Some(b_ledger));
    b.register_behaviour(ContractInbox::new(1));
    b.register_handler(Inbox(Arc::clone(&seen)));
    b.register_handler(CryptoHandler);

    tokio::time::advance(Duration::from_secs(1)).await;
    a.tick().await;
    assert_eq!(a.context().peers(), vec!["0xb".to_string()]);
    assert_eq!(chain.inbox("0xb").len(), 1);

    b.tick().await;
    let got = seen.lock().clone();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].text(), "crypto moon");
    assert_eq!(got[0].sender(), Some("0xa"));

    let transfers = chain.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!((transfers[0].from.as_str(), transfers[0].to.as_str()), ("0xb", "0xa"));
    assert_eq!(chain.acknowledgements().len(), 1);
    assert!(chain.inbox("0xb").is_empty());
}

#[tokio::test]
async fn test_crypto_without_sender_sends_nothing() {
    let chain = MemoryChain::default();
    chain.mint("0xa", 5);
    let ledger: Arc<dyn Ledger> = Arc::new(chain.ledger("0xa"));
    let ctx = AgentContext::new(idle_transport(), Some(ledger));

    assert!(CryptoHandler.handle(&Message::new(1, "crypto"), &ctx).await.unwrap());
    assert!(chain.transfers().is_empty());
}

#[tokio::test]
async fn test_discover_skips_self_and_duplicates() {
    let chain = MemoryChain::default();
    let ledger: Arc<dyn Ledger> = Arc::new(chain.ledger("0xa"));
    let _ = chain.ledger("0xb");
    let ctx = AgentContext::new(idle_transport(), Some(ledger));

    assert!(!ctx.add_peer("0xa"));
    assert!(ctx.add_peer("0xb"));
    assert!(!ctx.add_peer("0xb"));
    assert_eq!(ctx.peers(), vec!["0xb".to_string()]);
}

// ── Wiring ─────────────────────────────────────────────────────

#[test]
fn test_default_registration_per_messaging_mode() {
    let mut config = SagentConfig::default();
    let mut plain = Agent::new(&config, idle_transport(), None);
    plain.register_defaults(&config);
    assert_eq!(
        plain.behaviour_names(),
        vec!["random_message", "drain_inbox", "flush_outbox"]
    );
    assert_eq!(plain.context().handler_count(), 1);

    config.behaviours.messaging = MessagingMode::Contract;
    let chain = MemoryChain::default();
    let ledger: Arc<dyn Ledger> = Arc::new(chain.ledger("0xa"));
    let mut onchain = Agent::new(&config, idle_transport(), Some(ledger));
    onchain.register_defaults(&config);
    assert_eq!(
        onchain.behaviour_names(),
        vec!["discover_peers", "random_message", "check_balance", "contract_inbox"]
    );
    assert_eq!(onchain.context().handler_count(), 2);
}

// ── End to end ─────────────────────────────────────────────────

fn free_addr() -> String {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_two_socket_agents_say_hello() {
    let a_addr = free_addr();
    let b_addr = free_addr();
    let config = SagentConfig::default();
    let fast = TransportConfig {
        reconnect_backoff_secs: 1,
        ..Default::default()
    };

    let a_transport = Arc::new(SocketTransport::new(a_addr, Some(b_addr.clone()), &fast));
    let mut a = Agent::new(&config, a_transport, None);
    a.register_behaviour(
        RandomMessage::new(1, Delivery::Outbox).with_words(|| "hello sun".to_string()),
    );
    a.register_behaviour(FlushOutbox::new(1));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let b_transport = Arc::new(SocketTransport::new(b_addr, None, &fast));
    let mut b = Agent::new(&config, b_transport, None);
    b.register_behaviour(DrainInbox::new(1));
    b.register_handler(KeywordHandler::hello());
    b.register_handler(Inbox(Arc::clone(&seen)));

    let b_task = tokio::spawn(b.run());
    let a_task = tokio::spawn(a.run());

    let mut first = None;
    for _ in 0..100 {
        if let Some(m) = seen.lock().first().cloned() {
            first = Some(m);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    a_task.abort();
    b_task.abort();

    let first = first.expect("B never received A's message");
    assert_eq!(first.id(), 1);
    assert_eq!(first.text(), "hello sun");
}
