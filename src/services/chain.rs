use crate::{
    config::RelayConfig,
    types::{Network, NetworkError},
};
use async_trait::async_trait;
use ethers::{
    abi::{parse_abi, Abi},
    contract::{Contract, ContractCall, ContractError},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, Bytes, H256, U256, U64},
};
use std::sync::Arc;
use tracing::{debug, info};

pub type RelayerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

const RECEIVER_ABI: &[&str] = &[
    "function executeMetaTransaction(bytes[] messages, bytes[] signatures)",
    "function setRelayer(address relayer)",
];

const EXECUTE_META_TRANSACTION: &str = "executeMetaTransaction";
const SET_RELAYER: &str = "setRelayer";

/// The relayer's signing key bound to a chain connection and the receiver
/// contract. Built once at startup and shared read-only afterwards.
pub struct RelayerIdentity {
    client: Arc<RelayerClient>,
    receiver: Contract<RelayerClient>,
    chain_id: u64,
}

impl RelayerIdentity {
    pub async fn connect(config: &RelayConfig) -> Result<Self, NetworkError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;

        let reported = provider
            .get_chainid()
            .await
            .map_err(|e| NetworkError::Rpc(e.to_string()))?
            .low_u64();
        let chain_id = match config.chain_id {
            Some(configured) if configured != reported => {
                return Err(NetworkError::ChainIdMismatch {
                    configured,
                    reported,
                })
            }
            Some(configured) => configured,
            None => reported,
        };

        let key = config.private_key.trim_start_matches("0x");
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| NetworkError::InvalidKey(e.to_string()))?
            .with_chain_id(chain_id);

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let abi: Abi = parse_abi(RECEIVER_ABI).map_err(|e| NetworkError::Encoding(e.to_string()))?;
        let receiver = Contract::new(config.receiver_address, abi, client.clone());

        info!(
            relayer = ?client.address(),
            receiver = ?config.receiver_address,
            chain_id,
            "relayer identity ready"
        );

        Ok(Self {
            client,
            receiver,
            chain_id,
        })
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Registers this key as the receiver's relayer via `setRelayer(address)`.
    pub async fn register_relayer(&self) -> Result<H256, NetworkError> {
        let call = self
            .receiver
            .method::<_, ()>(SET_RELAYER, self.address())
            .map_err(|e| NetworkError::Encoding(e.to_string()))?;
        let tx_hash = confirm(call).await?;
        info!(tx = ?tx_hash, relayer = ?self.address(), "relayer registered");
        Ok(tx_hash)
    }

    fn execute_call(
        &self,
        entries: Vec<Bytes>,
        signatures: Vec<Bytes>,
    ) -> Result<ContractCall<RelayerClient, ()>, NetworkError> {
        self.receiver
            .method::<_, ()>(EXECUTE_META_TRANSACTION, (entries, signatures))
            .map_err(|e| NetworkError::Encoding(e.to_string()))
    }
}

/// Sends `call` and waits for a receipt with status 1.
async fn confirm(call: ContractCall<RelayerClient, ()>) -> Result<H256, NetworkError> {
    let pending = call
        .send()
        .await
        .map_err(|e| NetworkError::Dispatch(e.to_string()))?;
    let tx_hash = *pending;
    debug!(tx = ?tx_hash, "transaction sent, awaiting receipt");

    let receipt = pending
        .await
        .map_err(|e| NetworkError::Confirmation(tx_hash, e.to_string()))?
        .ok_or(NetworkError::Dropped(tx_hash))?;

    if receipt.status == Some(U64::one()) {
        Ok(tx_hash)
    } else {
        Err(NetworkError::Reverted(tx_hash))
    }
}

/// Only a revert says something about the batch itself; anything else
/// (transport, rate limits, node errors) is the chain being unavailable.
fn simulation_error(error: ContractError<RelayerClient>) -> NetworkError {
    let message = error.to_string();
    if error.is_revert() || is_revert_message(&message) {
        NetworkError::Simulation(message)
    } else {
        NetworkError::Rpc(message)
    }
}

/// Nodes report a reverting `eth_estimateGas` as a JSON-RPC error whose
/// message mentions the revert (geth: "execution reverted", anvil/hardhat:
/// "reverted with reason string ...").
fn is_revert_message(message: &str) -> bool {
    message.to_ascii_lowercase().contains("revert")
}

#[async_trait]
impl Network for RelayerIdentity {
    async fn simulate_batch(
        &self,
        entries: Vec<Bytes>,
        signatures: Vec<Bytes>,
    ) -> Result<U256, NetworkError> {
        self.execute_call(entries, signatures)?
            .estimate_gas()
            .await
            .map_err(simulation_error)
    }

    async fn dispatch_batch(
        &self,
        entries: Vec<Bytes>,
        signatures: Vec<Bytes>,
        gas_limit: U256,
    ) -> Result<H256, NetworkError> {
        let call = self.execute_call(entries, signatures)?.gas(gas_limit);
        confirm(call).await
    }
}
