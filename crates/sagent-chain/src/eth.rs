//! Ethereum JSON-RPC ledger.
//!
//! The agent account is the key in `chain.private_key`. Its on-chain identity
//! is the smart-agent contract the factory maps that account to; one is
//! deployed through the factory on first connect.

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::utils::to_checksum;
use sagent_config::ChainConfig;
use sagent_core::{Result, SagentError};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ledger::{Balance, InboxEntry, Ledger, TxHandle};

abigen!(
    SmartAgent,
    r#"[
        function addToInbox(address sender, string message)
        function ackMsg(uint256 messageId)
        function inBox(uint256) external view returns (string, address)
        function owner() external view returns (address)
    ]"#
);

abigen!(
    SmartAgentFactory,
    r#"[
        function createSmartAgent() external returns (address)
        function getSmartAgent(uint256 index) external view returns (address)
        function getSmartAgentCount() external view returns (uint256)
        function smartAgentContractMapping(address) external view returns (address)
        function smartAgents(uint256) external view returns (address)
    ]"#
);

abigen!(
    Erc20Token,
    r#"[
        function transfer(address recipient, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
    ]"#
);

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

fn chain_err(e: impl std::fmt::Display) -> SagentError {
    SagentError::Chain(e.to_string())
}

fn parse_address(s: &str) -> Result<Address> {
    s.parse::<Address>()
        .map_err(|e| SagentError::InvalidAddress(format!("{s}: {e}")))
}

/// [`Ledger`] backed by a JSON-RPC node.
pub struct EthLedger {
    client: Arc<Client>,
    factory: SmartAgentFactory<Client>,
    token: Erc20Token<Client>,
    smart_agent: SmartAgent<Client>,
    address: String,
}

impl EthLedger {
    /// Connect to the node, load the signing key and resolve (or deploy) the
    /// agent's smart-agent contract.
    pub async fn connect(config: &ChainConfig) -> Result<Self> {
        let provider_url = config
            .provider_url
            .as_deref()
            .ok_or_else(|| SagentError::Config("chain.provider_url is not set".into()))?;
        let private_key = config
            .private_key
            .as_deref()
            .ok_or_else(|| SagentError::Config("chain.private_key is not set".into()))?;
        let factory_address = config
            .factory_address
            .as_deref()
            .ok_or_else(|| SagentError::Config("chain.factory_address is not set".into()))?;

        let provider = Provider::<Http>::try_from(provider_url)
            .map_err(|e| SagentError::Config(format!("invalid provider url {provider_url}: {e}")))?;
        let chain_id = provider.get_chainid().await.map_err(chain_err)?;
        let wallet = private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| SagentError::Config(format!("invalid private key: {e}")))?
            .with_chain_id(chain_id.as_u64());
        let account = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider, wallet));

        let factory = SmartAgentFactory::new(parse_address(factory_address)?, Arc::clone(&client));
        let token = Erc20Token::new(parse_address(&config.token_address)?, Arc::clone(&client));

        let agent_address = Self::resolve_smart_agent(&factory, account).await?;
        let smart_agent = SmartAgent::new(agent_address, Arc::clone(&client));
        let address = to_checksum(&agent_address, None);

        info!(
            account = %to_checksum(&account, None),
            smart_agent = %address,
            chain_id = %chain_id,
            "connected to chain"
        );

        Ok(Self {
            client,
            factory,
            token,
            smart_agent,
            address,
        })
    }

    /// The externally owned account that signs transactions.
    pub fn account(&self) -> String {
        to_checksum(&self.client.address(), None)
    }

    async fn resolve_smart_agent(
        factory: &SmartAgentFactory<Client>,
        account: Address,
    ) -> Result<Address> {
        let existing = factory
            .smart_agent_contract_mapping(account)
            .call()
            .await
            .map_err(chain_err)?;
        if !existing.is_zero() {
            info!(smart_agent = %to_checksum(&existing, None), "existing smart agent found");
            return Ok(existing);
        }

        info!("no smart agent registered for account, deploying one");
        let call = factory.create_smart_agent();
        let pending = call.send().await.map_err(chain_err)?;
        let receipt = pending.await.map_err(chain_err)?;
        debug!(tx = ?receipt.as_ref().map(|r| r.transaction_hash), "createSmartAgent mined");

        let deployed = factory
            .smart_agent_contract_mapping(account)
            .call()
            .await
            .map_err(chain_err)?;
        if deployed.is_zero() {
            return Err(SagentError::Chain(
                "factory did not register a smart agent for this account".into(),
            ));
        }
        info!(smart_agent = %to_checksum(&deployed, None), "new smart agent deployed");
        Ok(deployed)
    }

    async fn token_unit(&self) -> Result<U256> {
        let decimals = self.token.decimals().call().await.map_err(chain_err)?;
        Ok(U256::exp10(usize::from(decimals)))
    }
}

#[async_trait]
impl Ledger for EthLedger {
    fn address(&self) -> &str {
        &self.address
    }

    async fn check_balance(&self) -> Result<Balance> {
        let raw = self
            .token
            .balance_of(self.smart_agent.address())
            .call()
            .await
            .map_err(chain_err)?;
        let decimals = self.token.decimals().call().await.map_err(chain_err)?;
        let raw = u128::try_from(raw)
            .map_err(|_| SagentError::Chain(format!("balance {raw} does not fit in u128")))?;
        Ok(Balance::new(raw, decimals))
    }

    async fn send_token(&self, to: &str, amount: u64) -> Result<bool> {
        let to = parse_address(to)?;
        let value = U256::from(amount)
            .checked_mul(self.token_unit().await?)
            .ok_or_else(|| SagentError::Chain(format!("transfer amount {amount} overflows")))?;

        let call = self.token.transfer(to, value);
        let pending = call.send().await.map_err(chain_err)?;
        let tx_hash = *pending;
        let receipt = pending.await.map_err(chain_err)?;
        let ok = receipt
            .as_ref()
            .and_then(|r| r.status)
            .is_some_and(|status| status == U64::from(1));
        if !ok {
            warn!(tx = ?tx_hash, "token transfer did not succeed");
        }
        Ok(ok)
    }

    async fn send_contract_message(
        &self,
        sender: &str,
        receiver: &str,
        text: &str,
    ) -> Result<TxHandle> {
        let receiver = SmartAgent::new(parse_address(receiver)?, Arc::clone(&self.client));
        let call = receiver.add_to_inbox(parse_address(sender)?, text.to_string());
        let pending = call.send().await.map_err(chain_err)?;
        Ok(TxHandle(format!("{:?}", *pending)))
    }

    async fn fetch_inbox(&self) -> Result<Option<InboxEntry>> {
        match self.smart_agent.in_box(U256::zero()).call().await {
            Ok((text, sender)) if text.is_empty() && sender.is_zero() => Ok(None),
            Ok((text, sender)) => Ok(Some(InboxEntry {
                id: 0,
                text,
                sender: to_checksum(&sender, None),
            })),
            // Reading past the end of the inbox array reverts.
            Err(e) if e.is_revert() => Ok(None),
            Err(e) => Err(chain_err(e)),
        }
    }

    async fn acknowledge_message(&self, id: u64) -> Result<()> {
        let call = self.smart_agent.ack_msg(U256::from(id));
        let pending = call.send().await.map_err(chain_err)?;
        pending.await.map_err(chain_err)?;
        Ok(())
    }

    async fn discover_peers(&self) -> Result<Vec<String>> {
        let count = self
            .factory
            .get_smart_agent_count()
            .call()
            .await
            .map_err(chain_err)?;
        let count = u64::try_from(count)
            .map_err(|_| SagentError::Chain(format!("implausible smart agent count {count}")))?;
        let mut agents = Vec::new();
        for index in 0..count {
            let agent = self
                .factory
                .get_smart_agent(U256::from(index))
                .call()
                .await
                .map_err(chain_err)?;
            agents.push(to_checksum(&agent, None));
        }
        Ok(agents)
    }
}
