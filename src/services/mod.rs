pub mod chain;
pub mod gas;
pub mod submitter;

pub use chain::RelayerIdentity;
pub use gas::GasEstimator;
pub use submitter::{BatchSubmitter, SendOutcome};
