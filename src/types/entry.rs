use crate::types::RelayError;
use ethers::{
    abi::{self, Token},
    types::{Address, Bytes, U256},
};
use serde::{Deserialize, Serialize};

/// A user-signed swap intent waiting to be relayed.
///
/// Field order is fixed: it is the order of the typed-data schema and of the
/// canonical ABI encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub user: Address,
    #[serde(rename = "rfsId", alias = "requestId", with = "uint")]
    pub request_id: U256,
    #[serde(rename = "makerAddress", alias = "counterparty")]
    pub counterparty: Address,
    #[serde(rename = "paypalEmail", alias = "paymentId")]
    pub payment_id: String,
    #[serde(rename = "amountToBuy", alias = "amount", with = "uint")]
    pub amount: U256,
    #[serde(with = "uint")]
    pub nonce: U256,
}

impl PendingEntry {
    /// ABI encoding of `(address, uint256, address, string, uint256, uint256)`.
    ///
    /// This is what the receiver contract decodes, and what the batch uses to
    /// detect duplicates.
    pub fn encode(&self) -> Bytes {
        abi::encode(&[
            Token::Address(self.user),
            Token::Uint(self.request_id),
            Token::Address(self.counterparty),
            Token::String(self.payment_id.clone()),
            Token::Uint(self.amount),
            Token::Uint(self.nonce),
        ])
        .into()
    }
}

/// Read-only copy of the pending batch, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    #[serde(rename = "messages", alias = "entries")]
    pub entries: Vec<Bytes>,
    pub signatures: Vec<Bytes>,
}

impl BatchSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.signatures.is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub message: Option<PendingEntry>,
    #[serde(default)]
    pub signature: Option<Bytes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub reason: String,
}

impl SubmitResponse {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: "transaction added to batch".to_string(),
        }
    }

    pub fn rejected(error: &RelayError) -> Self {
        Self {
            accepted: false,
            reason: error.to_string(),
        }
    }
}

impl From<Result<(), RelayError>> for SubmitResponse {
    fn from(result: Result<(), RelayError>) -> Self {
        match result {
            Ok(()) => Self::accepted(),
            Err(e) => Self::rejected(&e),
        }
    }
}

/// An entry evicted from the batch because it kept reverting on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeadLetter {
    pub message: Bytes,
    pub signature: Bytes,
    pub failed_flushes: u32,
}

/// Lenient `uint256` (de)serialization: accepts JSON numbers, decimal or
/// `0x` strings, and the `{ "type": "BigNumber", "hex": "0x.." }` shape that
/// ethers.js produces when a BigNumber is stringified.
mod uint {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse(&value).ok_or_else(|| D::Error::custom(format!("invalid uint256: {value}")))
    }

    fn parse(value: &Value) -> Option<U256> {
        match value {
            Value::Number(n) => n.as_u64().map(U256::from),
            Value::String(s) => parse_str(s),
            Value::Object(map) => map.get("hex").and_then(Value::as_str).and_then(parse_str),
            _ => None,
        }
    }

    fn parse_str(s: &str) -> Option<U256> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) if !digits.is_empty() => U256::from_str_radix(digits, 16).ok(),
            Some(_) => None,
            None => U256::from_dec_str(s).ok(),
        }
    }
}
