pub mod crypto;

pub use crypto::{SignatureValidator, TypedDataDomain};
