use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use sagent_config::{ConfigLoader, MessagingMode, SagentConfig, TransportMode};
use tracing::warn;

mod start;

/// sagent: a single-peer autonomous agent
#[derive(Parser)]
#[command(name = "sagent", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to sagent.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent: serve the transport and run behaviours until Ctrl-C
    Start(StartArgs),
    /// Show version and build info
    Version,
    /// Show the effective configuration (secrets masked)
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Per-run overrides. They win over the config file and the environment.
#[derive(Args, Debug, Default)]
pub(crate) struct StartArgs {
    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Peer host to deliver the outbox to
    #[arg(long)]
    peer_host: Option<String>,

    /// Peer port to deliver the outbox to
    #[arg(long)]
    peer_port: Option<u16>,

    /// Transport: socket or http
    #[arg(long)]
    mode: Option<TransportMode>,

    /// Messaging: transport or contract
    #[arg(long)]
    messaging: Option<MessagingMode>,

    /// Hex private key of the agent's wallet
    #[arg(short = 'k', long = "key")]
    private_key: Option<String>,

    /// Smart agent factory contract address
    #[arg(short = 'f', long = "factory")]
    factory_address: Option<String>,

    /// JSON-RPC provider URL
    #[arg(short = 'r', long = "rpc")]
    provider_url: Option<String>,

    /// ERC-20 token contract address
    #[arg(short = 'd', long = "dai")]
    token_address: Option<String>,
}

impl StartArgs {
    pub(crate) fn apply_to(&self, config: &mut SagentConfig) {
        if let Some(ref host) = self.host {
            config.node.host = host.clone();
        }
        if let Some(port) = self.port {
            config.node.port = Some(port);
        }
        if let Some(ref host) = self.peer_host {
            config.peer.host = Some(host.clone());
        }
        if let Some(port) = self.peer_port {
            config.peer.port = Some(port);
        }
        if let Some(mode) = self.mode {
            config.transport.mode = mode;
        }
        if let Some(messaging) = self.messaging {
            config.behaviours.messaging = messaging;
        }
        if let Some(ref key) = self.private_key {
            config.chain.private_key = Some(key.clone());
        }
        if let Some(ref factory) = self.factory_address {
            config.chain.factory_address = Some(factory.clone());
        }
        if let Some(ref rpc) = self.provider_url {
            config.chain.provider_url = Some(rpc.clone());
        }
        if let Some(ref token) = self.token_address {
            config.chain.token_address = token.clone();
        }
    }
}

impl Cli {
    pub async fn run(self) -> sagent_core::Result<()> {
        match &self.command {
            Commands::Start(args) => {
                let loader =
                    ConfigLoader::load_with(self.config.as_deref(), |c| args.apply_to(c))?;
                let config = loader.get();

                init_tracing(&config, self.resolve_log_level(&config));
                for w in loader.warnings() {
                    warn!("{}", w);
                }

                start::cmd_start(config).await
            }
            Commands::Version => Self::cmd_version(),
            Commands::Config { json } => {
                let config = ConfigLoader::read(self.config.as_deref(), |_| {})?.into_config();
                Self::cmd_config(&config, *json)
            }
        }
    }

    /// --verbose > --quiet > --log-level > config
    fn resolve_log_level<'a>(&'a self, config: &'a SagentConfig) -> &'a str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        }
    }

    /// Print the config (secrets masked) on stdout and its validation
    /// findings on stderr. An invalid config is reported, not fatal.
    fn cmd_config(config: &SagentConfig, json: bool) -> sagent_core::Result<()> {
        let shown = config.redacted();
        let rendered = if json {
            serde_json::to_string_pretty(&shown)?
        } else {
            toml::to_string_pretty(&shown)
                .map_err(|e| sagent_core::SagentError::Config(e.to_string()))?
        };
        println!("{rendered}");

        match config.validate() {
            Ok(warnings) => {
                for w in warnings {
                    eprintln!("{w}");
                }
            }
            Err(errors) => eprintln!("{errors}"),
        }
        Ok(())
    }

    fn cmd_version() -> sagent_core::Result<()> {
        println!("sagent v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Build: debug");
        #[cfg(not(debug_assertions))]
        println!("   Build: release");
        Ok(())
    }
}

fn init_tracing(config: &SagentConfig, level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
