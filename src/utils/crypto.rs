//! EIP-712 hashing and signer recovery for swap intents.

use crate::types::PendingEntry;
use ethers::{
    abi::{self, Token},
    types::{Address, RecoveryMessage, Signature, H256, U256},
    utils::keccak256,
};
use tracing::debug;

pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

pub const TRANSACTION_TYPE: &str = concat!(
    "Transaction(address user,uint256 rfsId,address makerAddress,",
    "string paypalEmail,uint256 amountToBuy,uint256 nonce)"
);

pub const DEFAULT_DOMAIN_NAME: &str = "OTC Swap Protocol";
pub const DEFAULT_DOMAIN_VERSION: &str = "1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedDataDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl TypedDataDomain {
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: DEFAULT_DOMAIN_NAME.to_string(),
            version: DEFAULT_DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn separator(&self) -> H256 {
        H256(keccak256(abi::encode(&[
            Token::FixedBytes(keccak256(DOMAIN_TYPE).to_vec()),
            Token::FixedBytes(keccak256(self.name.as_bytes()).to_vec()),
            Token::FixedBytes(keccak256(self.version.as_bytes()).to_vec()),
            Token::Uint(U256::from(self.chain_id)),
            Token::Address(self.verifying_contract),
        ])))
    }
}

/// `hashStruct` of an entry under [`TRANSACTION_TYPE`].
pub fn struct_hash(entry: &PendingEntry) -> H256 {
    H256(keccak256(abi::encode(&[
        Token::FixedBytes(keccak256(TRANSACTION_TYPE).to_vec()),
        Token::Address(entry.user),
        Token::Uint(entry.request_id),
        Token::Address(entry.counterparty),
        Token::FixedBytes(keccak256(entry.payment_id.as_bytes()).to_vec()),
        Token::Uint(entry.amount),
        Token::Uint(entry.nonce),
    ])))
}

/// Checks that an entry was signed by its own `user` under a fixed domain.
#[derive(Clone, Debug)]
pub struct SignatureValidator {
    domain: TypedDataDomain,
    separator: H256,
}

impl SignatureValidator {
    pub fn new(domain: TypedDataDomain) -> Self {
        let separator = domain.separator();
        Self { domain, separator }
    }

    pub fn domain(&self) -> &TypedDataDomain {
        &self.domain
    }

    /// The hash a wallet signs: `keccak256(0x1901 ‖ domainSeparator ‖ hashStruct(entry))`.
    pub fn digest(&self, entry: &PendingEntry) -> H256 {
        let mut preimage = Vec::with_capacity(2 + 32 + 32);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(self.separator.as_bytes());
        preimage.extend_from_slice(struct_hash(entry).as_bytes());
        H256(keccak256(preimage))
    }

    /// True iff `signature` recovers to `entry.user`. Malformed input is a
    /// plain `false`.
    pub fn validate(&self, entry: &PendingEntry, signature: &[u8]) -> bool {
        let signature = match Signature::try_from(signature) {
            Ok(signature) => signature,
            Err(e) => {
                debug!(error = %e, "malformed signature");
                return false;
            }
        };

        match signature.recover(RecoveryMessage::Hash(self.digest(entry))) {
            Ok(recovered) => {
                if recovered != entry.user {
                    debug!(?recovered, expected = ?entry.user, "signer mismatch");
                }
                recovered == entry.user
            }
            Err(e) => {
                debug!(error = %e, "signature recovery failed");
                false
            }
        }
    }
}
