use ethers::types::H256;
use thiserror::Error;

/// Why an entry was not admitted, or why a batch was not sent.
///
/// The `Display` strings are the `reason` returned to ingress callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("message or signature not provided")]
    Input,
    #[error("invalid message or signature")]
    Validation,
    #[error("transaction already submitted")]
    Duplicate,
    #[error("transaction would fail")]
    SimulationFailure,
    #[error("batch already full")]
    Capacity,
    #[error("length mismatch")]
    LengthMismatch,
    #[error("must contain at least 1 transaction")]
    EmptyBatch,
    #[error("send error")]
    Submission,
}

/// Failures of the chain client.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),
    #[error("invalid relayer key: {0}")]
    InvalidKey(String),
    #[error("chain id mismatch: configured {configured}, node reports {reported}")]
    ChainIdMismatch { configured: u64, reported: u64 },
    #[error("contract call could not be built: {0}")]
    Encoding(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("simulation reverted: {0}")]
    Simulation(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("confirmation failed for {0:?}: {1}")]
    Confirmation(H256, String),
    #[error("transaction {0:?} dropped before confirmation")]
    Dropped(H256),
    #[error("transaction {0:?} reverted")]
    Reverted(H256),
}
