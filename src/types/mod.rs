pub mod entry;
pub mod error;
pub mod network;

pub use entry::{BatchSnapshot, DeadLetter, PendingEntry, SubmitRequest, SubmitResponse};
pub use error::{NetworkError, RelayError};
pub use network::Network;
#[cfg(test)]
pub use network::MockNetwork;
