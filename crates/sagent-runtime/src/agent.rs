use futures::FutureExt;
use sagent_chain::Ledger;
use sagent_config::{MessagingMode, SagentConfig};
use sagent_core::{Message, Result, SagentError};
use sagent_transport::Transport;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, error, info, info_span, warn};

use crate::behaviour::Behaviour;
use crate::behaviours::{
    CheckBalance, ContractInbox, Delivery, DiscoverPeers, DrainInbox, FlushOutbox, RandomMessage,
};
use crate::context::{AgentContext, panic_message};
use crate::handler::Handler;
use crate::handlers::{CryptoHandler, KeywordHandler};

/// The agent: behaviours run in registration order on every tick, handlers
/// see received messages in registration order.
pub struct Agent {
    ctx: AgentContext,
    behaviours: Vec<Box<dyn Behaviour>>,
    tick_interval: Duration,
}

impl Agent {
    pub fn new(
        config: &SagentConfig,
        transport: Arc<dyn Transport>,
        ledger: Option<Arc<dyn Ledger>>,
    ) -> Self {
        Self {
            ctx: AgentContext::new(transport, ledger)
                .with_transfer_amount(config.chain.transfer_amount),
            behaviours: Vec::new(),
            tick_interval: config.scheduler.tick_interval(),
        }
    }

    pub fn register_behaviour(&mut self, behaviour: impl Behaviour + 'static) {
        self.behaviours.push(Box::new(behaviour));
    }

    pub fn register_handler(&mut self, handler: impl Handler + 'static) {
        self.ctx.push_handler(Box::new(handler));
    }

    /// Register the stock behaviours and handlers for the configured
    /// messaging mode. Ledger-backed ones are skipped when there is no ledger.
    pub fn register_defaults(&mut self, config: &SagentConfig) {
        let b = &config.behaviours;
        let has_ledger = self.ctx.ledger().is_some();

        if has_ledger {
            self.register_behaviour(DiscoverPeers::new(b.discover_peers_secs));
        }
        match b.messaging {
            MessagingMode::Transport => {
                self.register_behaviour(RandomMessage::new(b.random_message_secs, Delivery::Outbox));
            }
            MessagingMode::Contract => {
                self.register_behaviour(RandomMessage::new(
                    b.random_message_secs,
                    Delivery::Contract,
                ));
            }
        }
        if has_ledger {
            self.register_behaviour(CheckBalance::new(b.check_balance_secs));
        }
        match b.messaging {
            MessagingMode::Transport => {
                self.register_behaviour(DrainInbox::new(b.drain_inbox_secs));
                self.register_behaviour(FlushOutbox::new(b.flush_outbox_secs));
            }
            MessagingMode::Contract => {
                self.register_behaviour(ContractInbox::new(b.drain_inbox_secs));
            }
        }

        self.register_handler(KeywordHandler::hello());
        if has_ledger {
            self.register_handler(CryptoHandler);
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// Names of the registered behaviours, in run order.
    pub fn behaviour_names(&self) -> Vec<&str> {
        self.behaviours.iter().map(|b| b.name()).collect()
    }

    /// Dispatch one message through the handler chain.
    pub async fn process_message(&self, message: &Message) -> usize {
        self.ctx.process_message(message).await
    }

    /// Run every behaviour once, in order. Failures and panics are logged
    /// per behaviour. Returns how many behaviours ran their logic.
    pub async fn tick(&mut self) -> usize {
        let mut ran = 0;
        for behaviour in self.behaviours.iter_mut() {
            let outcome = AssertUnwindSafe(behaviour.run(&self.ctx))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(true)) => ran += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    warn!(behaviour = behaviour.name(), error = %e, "behaviour failed");
                }
                Err(panic) => {
                    error!(
                        behaviour = behaviour.name(),
                        panic = %panic_message(panic.as_ref()),
                        "behaviour panicked"
                    );
                }
            }
        }
        ran
    }

    /// Serve the transport and run the scheduler until the transport fails.
    pub async fn run(mut self) -> Result<()> {
        let span = info_span!("agent", addr = %self.ctx.local_addr());
        async move {
            let transport = Arc::clone(self.ctx.transport());
            info!(
                transport = transport.kind(),
                peer = transport.state().peer_addr().unwrap_or("none"),
                identity = %self.ctx.identity(),
                behaviours = self.behaviours.len(),
                handlers = self.ctx.handler_count(),
                "agent starting"
            );

            let serve = transport.run();
            tokio::pin!(serve);
            let tick_interval = self.tick_interval;

            loop {
                tokio::select! {
                    result = &mut serve => {
                        return match result {
                            Ok(()) => Err(SagentError::Transport("transport stopped".into())),
                            Err(e) => Err(e),
                        };
                    }
                    _ = async {
                        self.tick().await;
                        tokio::time::sleep(tick_interval).await;
                    } => {}
                }
            }
        }
        .instrument(span)
        .await
    }
}
