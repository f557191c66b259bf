use crate::types::{BatchSnapshot, Network, RelayError};
use ethers::types::{H256, U256};
use std::sync::Arc;
use tracing::{error, info};

pub const DEFAULT_SUBMIT_GAS_LIMIT: u64 = 1_000_000;

/// Result of one submission attempt. `info` is the transaction hash on
/// success and the failure reason otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendOutcome {
    pub success: bool,
    pub info: String,
}

impl SendOutcome {
    fn sent(tx_hash: H256) -> Self {
        Self {
            success: true,
            info: format!("{tx_hash:#x}"),
        }
    }

    fn failed(error: RelayError) -> Self {
        Self {
            success: false,
            info: error.to_string(),
        }
    }
}

/// Sends a batch snapshot as one `executeMetaTransaction` call.
#[derive(Clone)]
pub struct BatchSubmitter {
    network: Arc<dyn Network>,
    gas_limit: U256,
}

impl BatchSubmitter {
    pub fn new(network: Arc<dyn Network>, gas_limit: u64) -> Self {
        Self {
            network,
            gas_limit: U256::from(gas_limit),
        }
    }

    pub async fn send(&self, batch: &BatchSnapshot) -> SendOutcome {
        match self.try_send(batch).await {
            Ok(tx_hash) => SendOutcome::sent(tx_hash),
            Err(e) => SendOutcome::failed(e),
        }
    }

    async fn try_send(&self, batch: &BatchSnapshot) -> Result<H256, RelayError> {
        if batch.entries.len() != batch.signatures.len() {
            return Err(RelayError::LengthMismatch);
        }
        if batch.entries.is_empty() {
            return Err(RelayError::EmptyBatch);
        }

        info!(count = batch.len(), gas_limit = %self.gas_limit, "dispatching batch");
        let tx_hash = self
            .network
            .dispatch_batch(
                batch.entries.clone(),
                batch.signatures.clone(),
                self.gas_limit,
            )
            .await
            .map_err(|e| {
                error!(error = %e, count = batch.len(), "batch submission failed");
                RelayError::Submission
            })?;

        info!(tx = ?tx_hash, count = batch.len(), "batch confirmed");
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MockNetwork, NetworkError};
    use ethers::types::Bytes;

    fn batch(entries: usize, signatures: usize) -> BatchSnapshot {
        BatchSnapshot {
            entries: (0..entries).map(|i| Bytes::from(vec![i as u8])).collect(),
            signatures: (0..signatures).map(|i| Bytes::from(vec![0x80 | i as u8])).collect(),
        }
    }

    #[tokio::test]
    async fn test_length_mismatch() {
        let mut network = MockNetwork::new();
        network.expect_dispatch_batch().times(0);
        let submitter = BatchSubmitter::new(Arc::new(network), DEFAULT_SUBMIT_GAS_LIMIT);

        let outcome = submitter.send(&batch(1, 0)).await;

        assert!(!outcome.success);
        assert_eq!(outcome.info, "length mismatch");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let mut network = MockNetwork::new();
        network.expect_dispatch_batch().times(0);
        let submitter = BatchSubmitter::new(Arc::new(network), DEFAULT_SUBMIT_GAS_LIMIT);

        let outcome = submitter.send(&batch(0, 0)).await;

        assert!(!outcome.success);
        assert_eq!(outcome.info, "must contain at least 1 transaction");
    }

    #[tokio::test]
    async fn test_success_returns_tx_hash() {
        let tx_hash = H256::repeat_byte(0xab);
        let mut network = MockNetwork::new();
        network
            .expect_dispatch_batch()
            .withf(|entries, signatures, gas_limit| {
                entries.len() == 2
                    && signatures.len() == 2
                    && *gas_limit == U256::from(DEFAULT_SUBMIT_GAS_LIMIT)
            })
            .times(1)
            .returning(move |_, _, _| Ok(tx_hash));
        let submitter = BatchSubmitter::new(Arc::new(network), DEFAULT_SUBMIT_GAS_LIMIT);

        let outcome = submitter.send(&batch(2, 2)).await;

        assert!(outcome.success);
        assert_eq!(outcome.info, format!("0x{}", "ab".repeat(32)));
    }

    #[tokio::test]
    async fn test_dispatch_error_is_send_error() {
        let mut network = MockNetwork::new();
        network
            .expect_dispatch_batch()
            .times(1)
            .returning(|_, _, _| Err(NetworkError::Dispatch("nonce too low".into())));
        let submitter = BatchSubmitter::new(Arc::new(network), DEFAULT_SUBMIT_GAS_LIMIT);

        let outcome = submitter.send(&batch(2, 2)).await;

        assert_eq!(
            outcome,
            SendOutcome {
                success: false,
                info: "send error".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_send_error() {
        let mut network = MockNetwork::new();
        network
            .expect_dispatch_batch()
            .returning(|_, _, _| Err(NetworkError::Reverted(H256::zero())));
        let submitter = BatchSubmitter::new(Arc::new(network), 500_000);

        let outcome = submitter.send(&batch(1, 1)).await;

        assert!(!outcome.success);
        assert_eq!(outcome.info, "send error");
    }
}
