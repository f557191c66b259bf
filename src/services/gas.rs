use crate::types::{Network, NetworkError};
use ethers::types::{Bytes, U256};
use std::sync::Arc;
use tracing::debug;

/// Dry-runs the aggregate call with a candidate appended to the batch.
#[derive(Clone)]
pub struct GasEstimator {
    network: Arc<dyn Network>,
}

impl GasEstimator {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self { network }
    }

    /// Simulated gas of executing `entries ‖ candidate` in one call.
    ///
    /// `0` means the appended batch would revert and the candidate must be
    /// rejected: one reverting member fails the whole aggregate call.
    pub async fn estimate(
        &self,
        entries: &[Bytes],
        signatures: &[Bytes],
        candidate: &Bytes,
        candidate_signature: &Bytes,
    ) -> u64 {
        let mut all_entries = entries.to_vec();
        all_entries.push(candidate.clone());
        let mut all_signatures = signatures.to_vec();
        all_signatures.push(candidate_signature.clone());

        let batch_len = all_entries.len();
        match self.simulate(all_entries, all_signatures).await {
            Ok(gas) => gas,
            Err(e) => {
                debug!(error = %e, batch_len, "simulation rejected candidate");
                0
            }
        }
    }

    /// Simulated gas of `entries` as they are, saturated into `u64`. Unlike
    /// [`estimate`](Self::estimate) this keeps reverts and an unreachable
    /// node apart.
    pub async fn simulate(
        &self,
        entries: Vec<Bytes>,
        signatures: Vec<Bytes>,
    ) -> Result<u64, NetworkError> {
        self.network
            .simulate_batch(entries, signatures)
            .await
            .map(|gas| gas.min(U256::from(u64::MAX)).as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MockNetwork;

    fn bytes(b: u8) -> Bytes {
        Bytes::from(vec![b])
    }

    #[tokio::test]
    async fn test_estimate_simulates_appended_batch() {
        let mut network = MockNetwork::new();
        network
            .expect_simulate_batch()
            .withf(|entries, signatures| {
                *entries == vec![bytes(1), bytes(2)] && *signatures == vec![bytes(11), bytes(12)]
            })
            .times(1)
            .returning(|_, _| Ok(U256::from(84_000)));

        let estimator = GasEstimator::new(Arc::new(network));
        let gas = estimator
            .estimate(&[bytes(1)], &[bytes(11)], &bytes(2), &bytes(12))
            .await;

        assert_eq!(gas, 84_000);
    }

    #[tokio::test]
    async fn test_revert_is_zero() {
        let mut network = MockNetwork::new();
        network
            .expect_simulate_batch()
            .returning(|_, _| Err(NetworkError::Simulation("execution reverted".into())));

        let estimator = GasEstimator::new(Arc::new(network));
        assert_eq!(estimator.estimate(&[], &[], &bytes(1), &bytes(2)).await, 0);
    }

    #[tokio::test]
    async fn test_huge_estimate_saturates() {
        let mut network = MockNetwork::new();
        network
            .expect_simulate_batch()
            .returning(|_, _| Ok(U256::MAX));

        let estimator = GasEstimator::new(Arc::new(network));
        assert_eq!(
            estimator.estimate(&[], &[], &bytes(1), &bytes(2)).await,
            u64::MAX
        );
    }

    #[tokio::test]
    async fn test_simulate_keeps_error_kind() {
        let mut network = MockNetwork::new();
        network
            .expect_simulate_batch()
            .returning(|_, _| Err(NetworkError::Rpc("connection refused".into())));

        let estimator = GasEstimator::new(Arc::new(network));
        let result = estimator.simulate(vec![bytes(1)], vec![bytes(2)]).await;

        assert!(matches!(result, Err(NetworkError::Rpc(_))));
    }
}
