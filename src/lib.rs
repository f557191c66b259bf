//! Meta-transaction relay for OTC swap intents.
//!
//! Users sign swap intents as EIP-712 typed data and post them to `/submit`.
//! Intents that verify, are not already pending and simulate cleanly are held
//! in a gas-bounded batch, which a timer periodically sends to the receiver
//! contract as a single `executeMetaTransaction` call signed by the relayer.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod handlers;
pub mod logging;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod types;
pub mod utils;

pub use config::{ConfigError, RelayConfig};
pub use scheduler::{FlushOutcome, FlushTask, RelayScheduler};
pub use services::{BatchSubmitter, GasEstimator, RelayerIdentity, SendOutcome};
pub use state::BatchAccumulator;
pub use types::{
    BatchSnapshot, DeadLetter, Network, NetworkError, PendingEntry, RelayError, SubmitRequest,
    SubmitResponse,
};
pub use utils::{SignatureValidator, TypedDataDomain};

/// Ingress routes: `POST /submit`, `GET /get-batch`, `GET /dead-letters`.
pub fn create_relay_router(scheduler: Arc<RelayScheduler>) -> Router {
    Router::new()
        .route("/submit", post(handlers::submit_handler))
        .route("/get-batch", get(handlers::get_batch_handler))
        .route("/dead-letters", get(handlers::dead_letters_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(scheduler)
}
