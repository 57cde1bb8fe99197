use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Token used for transfers and balance checks when none is configured (DAI).
pub const DEFAULT_TOKEN_ADDRESS: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F";

/// Root configuration, maps to `sagent.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SagentConfig {
    pub node: NodeConfig,
    pub peer: PeerConfig,
    pub transport: TransportConfig,
    pub scheduler: SchedulerConfig,
    pub behaviours: BehavioursConfig,
    pub chain: ChainConfig,
    pub logging: LoggingConfig,
}

// ── Node ───────────────────────────────────────────────────────

/// Where this agent listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Local bind host.
    pub host: String,
    /// Local bind port. Required.
    pub port: Option<u16>,
    /// Optional display name, only used in logs.
    pub name: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: None,
            name: None,
        }
    }
}

impl NodeConfig {
    /// `host:port` to bind, or an error naming the missing field.
    pub fn bind_addr(&self) -> sagent_core::Result<String> {
        if self.host.is_empty() {
            return Err(sagent_core::SagentError::ConfigValidation {
                field: "node.host".into(),
                reason: "local host is not set".into(),
            });
        }
        match self.port {
            Some(port) if port != 0 => Ok(format!("{}:{}", self.host, port)),
            _ => Err(sagent_core::SagentError::ConfigValidation {
                field: "node.port".into(),
                reason: "local port is not set".into(),
            }),
        }
    }
}

// ── Peer ───────────────────────────────────────────────────────

/// The single peer this agent talks to. Both fields unset = listen only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl PeerConfig {
    /// `host:port` of the peer when both halves are configured.
    pub fn address(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) if !host.is_empty() => Some(format!("{host}:{port}")),
            _ => None,
        }
    }
}

// ── Transport ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Persistent newline-delimited JSON over TCP.
    #[default]
    Socket,
    /// One HTTP POST per message.
    Http,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socket" | "tcp" => Ok(Self::Socket),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown transport mode '{other}' (expected socket or http)")),
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Socket => f.write_str("socket"),
            Self::Http => f.write_str("http"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    /// Bound on a single outbound connect attempt.
    pub connect_timeout_secs: u64,
    /// Bound on writing one frame to the peer socket.
    pub send_timeout_secs: u64,
    /// Bound on one outbound HTTP request.
    pub request_timeout_secs: u64,
    /// Fixed delay between outbound connect attempts.
    pub reconnect_backoff_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Socket,
            connect_timeout_secs: 5,
            send_timeout_secs: 5,
            request_timeout_secs: 10,
            reconnect_backoff_secs: 5,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}

// ── Scheduler ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between scheduler ticks, in milliseconds.
    pub tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_ms: 100 }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

// ── Behaviours ─────────────────────────────────────────────────

/// How messages travel between agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingMode {
    /// Outbox + transport flush, inbox drained from the transport.
    #[default]
    Transport,
    /// Messages written to each peer's smart-agent contract, inbox read from
    /// our own contract one slot at a time.
    Contract,
}

impl FromStr for MessagingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transport" => Ok(Self::Transport),
            "contract" => Ok(Self::Contract),
            other => Err(format!(
                "unknown messaging mode '{other}' (expected transport or contract)"
            )),
        }
    }
}

/// Cooldowns of the built-in behaviours, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioursConfig {
    pub messaging: MessagingMode,
    pub discover_peers_secs: u64,
    pub check_balance_secs: u64,
    pub random_message_secs: u64,
    pub drain_inbox_secs: u64,
    pub flush_outbox_secs: u64,
}

impl Default for BehavioursConfig {
    fn default() -> Self {
        Self {
            messaging: MessagingMode::Transport,
            discover_peers_secs: 10,
            check_balance_secs: 10,
            random_message_secs: 2,
            drain_inbox_secs: 1,
            flush_outbox_secs: 1,
        }
    }
}

impl BehavioursConfig {
    fn cooldowns(&self) -> [(&'static str, u64); 5] {
        [
            ("behaviours.discover_peers_secs", self.discover_peers_secs),
            ("behaviours.check_balance_secs", self.check_balance_secs),
            ("behaviours.random_message_secs", self.random_message_secs),
            ("behaviours.drain_inbox_secs", self.drain_inbox_secs),
            ("behaviours.flush_outbox_secs", self.flush_outbox_secs),
        ]
    }
}

// ── Chain ──────────────────────────────────────────────────────

/// Smart-agent contracts and the ERC-20 token the agent moves around.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint. Unset = run without a ledger.
    pub provider_url: Option<String>,
    /// Hex private key of the agent's account.
    pub private_key: Option<String>,
    /// Smart-agent factory contract.
    pub factory_address: Option<String>,
    /// ERC-20 token contract.
    pub token_address: String,
    /// Whole tokens sent by the crypto handler per matching message.
    pub transfer_amount: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            provider_url: None,
            private_key: None,
            factory_address: None,
            token_address: DEFAULT_TOKEN_ADDRESS.into(),
            transfer_amount: 1,
        }
    }
}

impl ChainConfig {
    /// A ledger is used only when an RPC endpoint is configured.
    pub fn is_enabled(&self) -> bool {
        self.provider_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({h})")?;
        }
        Ok(())
    }
}

impl SagentConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Local bind address ───
        if self.node.host.is_empty() {
            warnings.push(ConfigWarning {
                field: "node.host".into(),
                message: "local host is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set node.host or the HOST environment variable".into()),
            });
        } else if self.node.host == "0.0.0.0" {
            warnings.push(ConfigWarning {
                field: "node.host".into(),
                message: "binding to 0.0.0.0; agent is reachable from all interfaces".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        match self.node.port {
            None => warnings.push(ConfigWarning {
                field: "node.port".into(),
                message: "local port is not set".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set node.port or the PORT environment variable".into()),
            }),
            Some(0) => warnings.push(ConfigWarning {
                field: "node.port".into(),
                message: "local port must be non-zero".into(),
                severity: WarningSeverity::Error,
                hint: None,
            }),
            Some(_) => {}
        }

        // ── Peer ───
        let peer_host = self.peer.host.as_deref().filter(|h| !h.is_empty());
        match (peer_host, self.peer.port) {
            (Some(_), None) => warnings.push(ConfigWarning {
                field: "peer.port".into(),
                message: "peer host is set but peer port is not".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set peer.port or OUTBOX_PORT".into()),
            }),
            (None, Some(_)) => warnings.push(ConfigWarning {
                field: "peer.host".into(),
                message: "peer port is set but peer host is not".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set peer.host or OUTBOX_HOST".into()),
            }),
            (None, None) => warnings.push(ConfigWarning {
                field: "peer".into(),
                message: "no peer configured; outbound messages will stay queued".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            }),
            (Some(_), Some(_)) => {}
        }

        // ── Scheduler ───
        if self.scheduler.tick_ms == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.tick_ms".into(),
                message: "tick interval is 0, scheduler would spin".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use a value between 100 and 1000".into()),
            });
        }
        if self.transport.reconnect_backoff_secs == 0 {
            warnings.push(ConfigWarning {
                field: "transport.reconnect_backoff_secs".into(),
                message: "reconnect backoff is 0, connector would spin".into(),
                severity: WarningSeverity::Error,
                hint: Some("Default is 5".into()),
            });
        }

        // ── Behaviours ───
        for (field, secs) in self.behaviours.cooldowns() {
            if secs == 0 {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: "cooldown is 0, behaviour would run on every tick".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }

        // ── Chain ───
        if self.chain.is_enabled() {
            let missing: Vec<&str> = [
                ("chain.private_key", self.chain.private_key.is_none()),
                ("chain.factory_address", self.chain.factory_address.is_none()),
            ]
            .into_iter()
            .filter_map(|(field, missing)| missing.then_some(field))
            .collect();
            for field in missing {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: "required when chain.provider_url is set".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        } else if self.behaviours.messaging == MessagingMode::Contract {
            warnings.push(ConfigWarning {
                field: "behaviours.messaging".into(),
                message: "contract messaging needs a chain".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set chain.provider_url, chain.private_key and chain.factory_address".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.chain.private_key.is_some() {
            copy.chain.private_key = Some("********".into());
        }
        copy
    }
}
