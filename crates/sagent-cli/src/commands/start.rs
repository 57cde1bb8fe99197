use std::sync::Arc;
use tracing::{error, info};

use sagent_chain::{EthLedger, Ledger};
use sagent_config::SagentConfig;
use sagent_runtime::Agent;

pub(super) async fn cmd_start(config: SagentConfig) -> sagent_core::Result<()> {
    let transport = sagent_transport::build_transport(&config)?;

    let ledger: Option<Arc<dyn Ledger>> = if config.chain.is_enabled() {
        let ledger = EthLedger::connect(&config.chain).await?;
        let ledger: Arc<dyn Ledger> = Arc::new(ledger);
        Some(ledger)
    } else {
        None
    };

    let mut agent = Agent::new(&config, transport, ledger);
    agent.register_defaults(&config);

    println!("sagent v{}", env!("CARGO_PKG_VERSION"));
    if let Some(ref name) = config.node.name {
        println!("   Name: {name}");
    }
    println!("   Listening: {}", agent.context().local_addr());
    println!("   Transport: {}", config.transport.mode);
    println!(
        "   Peer: {}",
        config.peer.address().as_deref().unwrap_or("none")
    );
    println!("   Identity: {}", agent.context().identity());
    println!("   Behaviours: {}", agent.behaviour_names().join(", "));
    println!();

    tokio::select! {
        result = agent.run() => {
            if let Err(ref e) = result {
                error!(error = %e, "agent stopped");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
