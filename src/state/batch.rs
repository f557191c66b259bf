use crate::{
    services::gas::GasEstimator,
    types::{BatchSnapshot, DeadLetter, NetworkError, PendingEntry, RelayError},
    utils::crypto::SignatureValidator,
};
use ethers::types::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_GAS_BUDGET: u64 = 1_000_000;

/// Dead letters kept for inspection; older ones are dropped first.
const DEAD_LETTER_CAPACITY: usize = 256;

#[derive(Default)]
struct Batch {
    entries: Vec<Bytes>,
    signatures: Vec<Bytes>,
    /// Marginal gas each entry added when it was admitted.
    gas: Vec<u64>,
    cumulative_gas: u64,
}

impl Batch {
    fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            entries: self.entries.clone(),
            signatures: self.signatures.clone(),
        }
    }

    fn push(&mut self, entry: Bytes, signature: Bytes, gas: u64) {
        self.entries.push(entry);
        self.signatures.push(signature);
        self.gas.push(gas);
        self.cumulative_gas += gas;
    }

    fn drain_front(&mut self, n: usize) {
        let n = n.min(self.entries.len());
        self.entries.drain(..n);
        self.signatures.drain(..n);
        let drained: u64 = self.gas.drain(..n).sum();
        self.cumulative_gas = self.cumulative_gas.saturating_sub(drained);
    }
}

/// Owns the single pending batch and decides what gets into it.
///
/// The batch sits behind one async mutex that `add` holds across its gas
/// simulation, so admission checks always see the state they append to.
pub struct BatchAccumulator {
    batch: Mutex<Batch>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    validator: SignatureValidator,
    estimator: GasEstimator,
    max_gas_budget: u64,
}

impl BatchAccumulator {
    pub fn new(
        validator: SignatureValidator,
        estimator: GasEstimator,
        max_gas_budget: u64,
    ) -> Self {
        Self {
            batch: Mutex::new(Batch::default()),
            dead_letters: Mutex::new(Vec::new()),
            validator,
            estimator,
            max_gas_budget,
        }
    }

    pub fn max_gas_budget(&self) -> u64 {
        self.max_gas_budget
    }

    /// Admits `entry` into the batch, or says why not. A rejected entry
    /// leaves the batch untouched.
    pub async fn add(
        &self,
        entry: Option<&PendingEntry>,
        signature: Option<&Bytes>,
    ) -> Result<(), RelayError> {
        let (entry, signature) = match (entry, signature) {
            (Some(entry), Some(signature)) => (entry, signature),
            _ => return Err(RelayError::Input),
        };

        if !self.validator.validate(entry, signature) {
            return Err(RelayError::Validation);
        }

        let encoded = entry.encode();

        let mut batch = self.batch.lock().await;
        if batch.entries.contains(&encoded) {
            return Err(RelayError::Duplicate);
        }

        let simulated = self
            .estimator
            .estimate(&batch.entries, &batch.signatures, &encoded, signature)
            .await;
        if simulated == 0 {
            return Err(RelayError::SimulationFailure);
        }

        // The simulation covers the whole appended batch; the entry is charged
        // what it adds on top of what is already pending.
        let marginal = simulated.saturating_sub(batch.cumulative_gas).max(1);
        if batch.cumulative_gas.saturating_add(marginal) > self.max_gas_budget {
            debug!(
                cumulative_gas = batch.cumulative_gas,
                marginal,
                budget = self.max_gas_budget,
                "batch is full"
            );
            return Err(RelayError::Capacity);
        }

        batch.push(encoded, signature.clone(), marginal);
        info!(
            user = ?entry.user,
            nonce = %entry.nonce,
            gas = marginal,
            cumulative_gas = batch.cumulative_gas,
            pending = batch.entries.len(),
            "transaction added to batch"
        );
        Ok(())
    }

    pub async fn snapshot(&self) -> BatchSnapshot {
        self.batch.lock().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.batch.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn cumulative_gas(&self) -> u64 {
        self.batch.lock().await.cumulative_gas
    }

    /// Empties the batch. Idempotent.
    pub async fn clear(&self) {
        *self.batch.lock().await = Batch::default();
    }

    /// Drops the first `submitted` entries, i.e. the ones a flushed snapshot
    /// contained. Entries admitted while that flush was in flight stay.
    pub async fn clear_submitted(&self, submitted: usize) {
        let mut batch = self.batch.lock().await;
        if submitted >= batch.entries.len() {
            *batch = Batch::default();
        } else {
            batch.drain_front(submitted);
        }
    }

    /// Re-simulates every pending entry on its own and moves those that revert
    /// to the dead-letter list. Returns how many were evicted.
    ///
    /// Only a revert counts against an entry. If the chain cannot be reached
    /// the pass is abandoned and the batch stays as it was. Survivors keep the
    /// gas they were admitted with.
    pub async fn evict_reverting(&self, failed_flushes: u32) -> usize {
        let mut batch = self.batch.lock().await;

        let mut reverting = Vec::with_capacity(batch.entries.len());
        for (entry, signature) in batch.entries.iter().zip(&batch.signatures) {
            let simulated = self
                .estimator
                .simulate(vec![entry.clone()], vec![signature.clone()])
                .await;
            match simulated {
                Ok(gas) => reverting.push(gas == 0),
                Err(NetworkError::Simulation(reason)) => {
                    debug!(%reason, "pending entry reverts on its own");
                    reverting.push(true);
                }
                Err(e) => {
                    warn!(error = %e, "chain unavailable, eviction skipped");
                    return 0;
                }
            }
        }

        let pending = std::mem::take(&mut *batch);
        let mut evicted = Vec::new();
        for (((entry, signature), gas), reverts) in pending
            .entries
            .into_iter()
            .zip(pending.signatures)
            .zip(pending.gas)
            .zip(reverting)
        {
            if reverts {
                evicted.push(DeadLetter {
                    message: entry,
                    signature,
                    failed_flushes,
                });
            } else {
                batch.push(entry, signature, gas);
            }
        }
        drop(batch);

        let count = evicted.len();
        if count > 0 {
            warn!(count, failed_flushes, "evicted reverting entries from batch");
            let mut dead_letters = self.dead_letters.lock().await;
            dead_letters.extend(evicted);
            let overflow = dead_letters.len().saturating_sub(DEAD_LETTER_CAPACITY);
            dead_letters.drain(..overflow);
        }
        count
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::MockNetwork,
        utils::crypto::tests::{create_test_entry, create_test_wallet, sign_entry, test_validator},
    };
    use ethers::{signers::LocalWallet, types::U256};
    use std::sync::Arc;

    const GAS_PER_ENTRY: u64 = 100_000;

    /// A network where every entry costs `GAS_PER_ENTRY` and nothing reverts.
    fn linear_network() -> MockNetwork {
        let mut network = MockNetwork::new();
        network
            .expect_simulate_batch()
            .returning(|entries, _| Ok(U256::from(GAS_PER_ENTRY * entries.len() as u64)));
        network
    }

    fn accumulator(network: MockNetwork, budget: u64) -> BatchAccumulator {
        BatchAccumulator::new(
            test_validator(),
            GasEstimator::new(Arc::new(network)),
            budget,
        )
    }

    fn signed(wallet: &LocalWallet, nonce: u64) -> (PendingEntry, Bytes) {
        let entry = create_test_entry(wallet, nonce);
        let signature = sign_entry(&test_validator(), wallet, &entry);
        (entry, Bytes::from(signature))
    }

    #[tokio::test]
    async fn test_add_valid_entry() {
        let acc = accumulator(linear_network(), DEFAULT_MAX_GAS_BUDGET);
        let wallet = create_test_wallet();
        let (entry, signature) = signed(&wallet, 1);

        acc.add(Some(&entry), Some(&signature)).await.unwrap();

        let snapshot = acc.snapshot().await;
        assert_eq!(snapshot.entries, vec![entry.encode()]);
        assert_eq!(snapshot.signatures, vec![signature]);
        assert_eq!(acc.cumulative_gas().await, GAS_PER_ENTRY);
    }

    #[tokio::test]
    async fn test_missing_input() {
        let mut network = MockNetwork::new();
        network.expect_simulate_batch().times(0);
        let acc = accumulator(network, DEFAULT_MAX_GAS_BUDGET);
        let wallet = create_test_wallet();
        let (entry, signature) = signed(&wallet, 1);

        assert_eq!(acc.add(None, Some(&signature)).await, Err(RelayError::Input));
        assert_eq!(acc.add(Some(&entry), None).await, Err(RelayError::Input));
        assert!(acc.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_signature() {
        let mut network = MockNetwork::new();
        network.expect_simulate_batch().times(0);
        let acc = accumulator(network, DEFAULT_MAX_GAS_BUDGET);
        let wallet = create_test_wallet();
        let (mut entry, signature) = signed(&wallet, 1);
        entry.nonce += U256::one();

        assert_eq!(
            acc.add(Some(&entry), Some(&signature)).await,
            Err(RelayError::Validation)
        );
        assert!(acc.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected_once_admitted() {
        let acc = accumulator(linear_network(), DEFAULT_MAX_GAS_BUDGET);
        let wallet = create_test_wallet();
        let (entry, signature) = signed(&wallet, 1);

        acc.add(Some(&entry), Some(&signature)).await.unwrap();
        assert_eq!(
            acc.add(Some(&entry), Some(&signature)).await,
            Err(RelayError::Duplicate)
        );
        assert_eq!(acc.len().await, 1);
    }

    #[tokio::test]
    async fn test_simulation_failure() {
        let mut network = MockNetwork::new();
        network
            .expect_simulate_batch()
            .returning(|_, _| Err(NetworkError::Simulation("execution reverted".into())));
        let acc = accumulator(network, DEFAULT_MAX_GAS_BUDGET);
        let wallet = create_test_wallet();
        let (entry, signature) = signed(&wallet, 1);

        assert_eq!(
            acc.add(Some(&entry), Some(&signature)).await,
            Err(RelayError::SimulationFailure)
        );
        assert!(acc.is_empty().await);
        assert_eq!(acc.cumulative_gas().await, 0);
    }

    #[tokio::test]
    async fn test_over_budget_leaves_batch_unchanged() {
        let acc = accumulator(linear_network(), 2 * GAS_PER_ENTRY + 1);
        let wallet = create_test_wallet();

        for nonce in 1..=2 {
            let (entry, signature) = signed(&wallet, nonce);
            acc.add(Some(&entry), Some(&signature)).await.unwrap();
        }
        let before = acc.snapshot().await;

        let (entry, signature) = signed(&wallet, 3);
        assert_eq!(
            acc.add(Some(&entry), Some(&signature)).await,
            Err(RelayError::Capacity)
        );
        assert_eq!(acc.snapshot().await, before);
        assert_eq!(acc.cumulative_gas().await, 2 * GAS_PER_ENTRY);
    }

    #[tokio::test]
    async fn test_snapshot_keeps_call_order() {
        let acc = accumulator(linear_network(), DEFAULT_MAX_GAS_BUDGET);
        let wallet = create_test_wallet();

        let mut expected = Vec::new();
        for nonce in [5, 3, 9, 1] {
            let (entry, signature) = signed(&wallet, nonce);
            acc.add(Some(&entry), Some(&signature)).await.unwrap();
            expected.push((entry.encode(), signature));
        }

        let snapshot = acc.snapshot().await;
        let (entries, signatures): (Vec<_>, Vec<_>) = expected.into_iter().unzip();
        assert_eq!(snapshot.entries, entries);
        assert_eq!(snapshot.signatures, signatures);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let acc = accumulator(linear_network(), DEFAULT_MAX_GAS_BUDGET);
        let wallet = create_test_wallet();
        let (entry, signature) = signed(&wallet, 1);
        acc.add(Some(&entry), Some(&signature)).await.unwrap();

        acc.clear().await;
        assert_eq!(acc.snapshot().await, BatchSnapshot::default());
        acc.clear().await;
        assert_eq!(acc.snapshot().await, BatchSnapshot::default());
        assert_eq!(acc.cumulative_gas().await, 0);

        // a cleared entry may be submitted again
        acc.add(Some(&entry), Some(&signature)).await.unwrap();
        assert_eq!(acc.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear_submitted_keeps_later_entries() {
        let acc = accumulator(linear_network(), DEFAULT_MAX_GAS_BUDGET);
        let wallet = create_test_wallet();
        let mut later = None;
        for nonce in 1..=3 {
            let (entry, signature) = signed(&wallet, nonce);
            acc.add(Some(&entry), Some(&signature)).await.unwrap();
            later = Some(entry.encode());
        }

        acc.clear_submitted(2).await;

        let snapshot = acc.snapshot().await;
        assert_eq!(snapshot.entries, vec![later.unwrap()]);
        assert_eq!(snapshot.signatures.len(), 1);
        assert_eq!(acc.cumulative_gas().await, GAS_PER_ENTRY);

        acc.clear_submitted(5).await;
        assert!(acc.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_adds_respect_budget() {
        let acc = Arc::new(accumulator(linear_network(), 3 * GAS_PER_ENTRY));
        let wallet = create_test_wallet();

        let handles: Vec<_> = (1..=8)
            .map(|nonce| {
                let acc = acc.clone();
                let (entry, signature) = signed(&wallet, nonce);
                tokio::spawn(async move { acc.add(Some(&entry), Some(&signature)).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => admitted += 1,
                Err(e) => assert_eq!(e, RelayError::Capacity),
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(acc.len().await, 3);
        assert!(acc.cumulative_gas().await <= acc.max_gas_budget());
    }

    #[tokio::test]
    async fn test_evict_reverting_moves_entries_to_dead_letters() {
        let wallet = create_test_wallet();
        let (good, good_sig) = signed(&wallet, 1);
        let (bad, bad_sig) = signed(&wallet, 2);
        let bad_encoded = bad.encode();

        let poisoned = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut network = MockNetwork::new();
        {
            let poisoned = poisoned.clone();
            let bad_encoded = bad_encoded.clone();
            network.expect_simulate_batch().returning(move |entries, _| {
                if poisoned.load(std::sync::atomic::Ordering::SeqCst)
                    && entries.contains(&bad_encoded)
                {
                    Err(NetworkError::Simulation("execution reverted".into()))
                } else {
                    Ok(U256::from(GAS_PER_ENTRY * entries.len() as u64))
                }
            });
        }
        let acc = accumulator(network, DEFAULT_MAX_GAS_BUDGET);
        acc.add(Some(&good), Some(&good_sig)).await.unwrap();
        acc.add(Some(&bad), Some(&bad_sig)).await.unwrap();

        // the bad entry starts reverting after it was admitted
        poisoned.store(true, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(acc.evict_reverting(3).await, 1);

        assert_eq!(acc.snapshot().await.entries, vec![good.encode()]);
        assert_eq!(acc.cumulative_gas().await, GAS_PER_ENTRY);
        let dead = acc.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message, bad_encoded);
        assert_eq!(dead[0].signature, bad_sig);
        assert_eq!(dead[0].failed_flushes, 3);
    }

    #[tokio::test]
    async fn test_evict_keeps_batch_when_chain_unreachable() {
        let wallet = create_test_wallet();
        let online = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let mut network = MockNetwork::new();
        {
            let online = online.clone();
            network.expect_simulate_batch().returning(move |entries, _| {
                if online.load(std::sync::atomic::Ordering::SeqCst) {
                    Ok(U256::from(GAS_PER_ENTRY * entries.len() as u64))
                } else {
                    Err(NetworkError::Rpc("connection refused".into()))
                }
            });
        }
        let acc = accumulator(network, DEFAULT_MAX_GAS_BUDGET);
        for nonce in 1..=2 {
            let (entry, signature) = signed(&wallet, nonce);
            acc.add(Some(&entry), Some(&signature)).await.unwrap();
        }
        let before = acc.snapshot().await;

        online.store(false, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(acc.evict_reverting(3).await, 0);

        assert_eq!(acc.snapshot().await, before);
        assert_eq!(acc.cumulative_gas().await, 2 * GAS_PER_ENTRY);
        assert!(acc.dead_letters().await.is_empty());
    }
}
