use crate::types::NetworkError;
use async_trait::async_trait;
use ethers::types::{Bytes, H256, U256};

#[cfg(test)]
use mockall::automock;

/// Chain access needed by the relay: dry-run and real execution of the
/// receiver's aggregate call `executeMetaTransaction(bytes[], bytes[])`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Network: Send + Sync {
    /// Gas the aggregate call would use for these arguments. Errors when the
    /// call would revert.
    async fn simulate_batch(
        &self,
        entries: Vec<Bytes>,
        signatures: Vec<Bytes>,
    ) -> Result<U256, NetworkError>;

    /// Signs and sends the aggregate call as the relayer, then waits for a
    /// successful receipt.
    async fn dispatch_batch(
        &self,
        entries: Vec<Bytes>,
        signatures: Vec<Bytes>,
        gas_limit: U256,
    ) -> Result<H256, NetworkError>;
}
