//! Relayer configuration, read from environment variables.
//!
//! Environment variables used:
//! - HOST / PORT: ingress bind address (default "0.0.0.0" / 4000)
//! - RPC_URL: JSON-RPC endpoint (default "http://localhost:8545")
//! - PRIVATE_KEY: relayer signing key (required)
//! - RECEIVER_ADDRESS: receiver contract, also the typed-data verifying contract (required)
//! - CHAIN_ID: expected chain id; queried from the node when unset
//! - EIP712_NAME / EIP712_VERSION: typed-data domain (default "OTC Swap Protocol" / "1")
//! - FLUSH_INTERVAL_MS: flush period (default 10000)
//! - MAX_GAS_BUDGET: admission budget for one batch (default 1000000)
//! - SUBMIT_GAS_LIMIT: gas limit of the aggregate transaction (default 1000000)
//! - MAX_FLUSH_ATTEMPTS: consecutive failed flushes before reverting entries are evicted
//!   (unset = never)
//! - REGISTER_RELAYER: call `setRelayer` on startup (default false)

use crate::{
    services::submitter::DEFAULT_SUBMIT_GAS_LIMIT,
    state::batch::DEFAULT_MAX_GAS_BUDGET,
    utils::crypto::{DEFAULT_DOMAIN_NAME, DEFAULT_DOMAIN_VERSION},
};
use ethers::types::Address;
use std::{env, fmt, str::FromStr, time::Duration};
use thiserror::Error;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(10_000);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub rpc_url: String,
    /// Hex-encoded relayer key. Never printed.
    pub private_key: String,
    pub receiver_address: Address,
    pub chain_id: Option<u64>,
    pub domain_name: String,
    pub domain_version: String,
    pub flush_interval: Duration,
    pub max_gas_budget: u64,
    pub submit_gas_limit: u64,
    pub max_flush_attempts: Option<u32>,
    pub register_relayer: bool,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("receiver_address", &self.receiver_address)
            .field("chain_id", &self.chain_id)
            .field("domain_name", &self.domain_name)
            .field("domain_version", &self.domain_version)
            .field("flush_interval", &self.flush_interval)
            .field("max_gas_budget", &self.max_gas_budget)
            .field("submit_gas_limit", &self.submit_gas_limit)
            .field("max_flush_attempts", &self.max_flush_attempts)
            .field("register_relayer", &self.register_relayer)
            .finish()
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let private_key = var("PRIVATE_KEY").ok_or(ConfigError::Missing("PRIVATE_KEY"))?;
        let receiver_address = parse(
            "RECEIVER_ADDRESS",
            var("RECEIVER_ADDRESS").ok_or(ConfigError::Missing("RECEIVER_ADDRESS"))?,
        )?;

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", var("PORT"), 4000)?,
            rpc_url: var("RPC_URL").unwrap_or_else(|| "http://localhost:8545".to_string()),
            private_key,
            receiver_address,
            chain_id: var("CHAIN_ID").map(|v| parse("CHAIN_ID", v)).transpose()?,
            domain_name: var("EIP712_NAME").unwrap_or_else(|| DEFAULT_DOMAIN_NAME.to_string()),
            domain_version: var("EIP712_VERSION")
                .unwrap_or_else(|| DEFAULT_DOMAIN_VERSION.to_string()),
            flush_interval: var("FLUSH_INTERVAL_MS")
                .map(|v| parse::<u64>("FLUSH_INTERVAL_MS", v))
                .transpose()?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_FLUSH_INTERVAL),
            max_gas_budget: parse_or(
                "MAX_GAS_BUDGET",
                var("MAX_GAS_BUDGET"),
                DEFAULT_MAX_GAS_BUDGET,
            )?,
            submit_gas_limit: parse_or(
                "SUBMIT_GAS_LIMIT",
                var("SUBMIT_GAS_LIMIT"),
                DEFAULT_SUBMIT_GAS_LIMIT,
            )?,
            max_flush_attempts: var("MAX_FLUSH_ATTEMPTS")
                .map(|v| parse("MAX_FLUSH_ATTEMPTS", v))
                .transpose()?,
            register_relayer: var("REGISTER_RELAYER")
                .map(|v| parse_bool("REGISTER_RELAYER", v))
                .transpose()?
                .unwrap_or(false),
        })
        .and_then(Self::checked)
    }

    fn checked(self) -> Result<Self, ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "FLUSH_INTERVAL_MS",
                value: "0".to_string(),
            });
        }
        if self.max_flush_attempts == Some(0) {
            return Err(ConfigError::Invalid {
                var: "MAX_FLUSH_ATTEMPTS",
                value: "0".to_string(),
            });
        }
        Ok(self)
    }
}

fn parse<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}

fn parse_or<T: FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    value.map(|v| parse(var, v)).unwrap_or(Ok(default))
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid { var, value }),
    }
}
