//! Chain parameters
//!
//! Every protocol constant lives in [`ChainParams`], passed by reference to
//! whatever needs it. Parameters load from an optional TOML file; missing
//! keys keep their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::CompactTarget;
use crate::crypto::{address_from_pubkey, PublicKey};
use crate::storage::RetryPolicy;

/// One coin in base units
pub const COIN: u64 = 100_000_000;

/// Compressed secp256k1 generator point, the public key of private key 1
pub const GENERATOR_PUBKEY: [u8; 33] = [
    0x02, 0x79, 0xbe, 0x66, 0x7e, 0xf9, 0xdc, 0xbb, 0xac, 0x55, 0xa0, 0x62, 0x95, 0xce, 0x87,
    0x0b, 0x07, 0x02, 0x9b, 0xfc, 0xdb, 0x2d, 0xce, 0x28, 0xd9, 0x59, 0xf2, 0x81, 0x5b, 0x16,
    0xf8, 0x17, 0x98,
];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid parameter: {0}")]
    Invalid(String),
}

/// Protocol constants for one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    /// Retarget interval, in-memory window and fork horizon
    pub heartbeat: u64,
    /// Blocks between reward halvings
    pub halving_number: u64,
    /// Blocks before a mining output may be spent
    pub mining_delay: u64,
    pub genesis_reward: u64,
    /// Initial supply available as block subsidy
    pub total_supply: u64,
    pub genesis_target: CompactTarget,
    pub genesis_timestamp: u64,
    /// Receiver of the genesis reward; defaults to the generator-point address
    pub genesis_address: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            heartbeat: 10,
            halving_number: 10_000,
            mining_delay: 50,
            genesis_reward: 50 * COIN,
            total_supply: 21_000_000 * COIN,
            genesis_target: CompactTarget::new(0x0fffff, 0x20),
            // 2026-01-01T00:00:00Z
            genesis_timestamp: 1_767_225_600,
            genesis_address: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl ChainParams {
    /// Parse parameters from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let params: Self = toml::from_str(text)?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Small, fast parameters for tests and local experiments
    pub fn for_testing() -> Self {
        Self {
            heartbeat: 3,
            halving_number: 1_000,
            mining_delay: 2,
            genesis_reward: 5_000,
            total_supply: 1_000_000_000,
            genesis_target: CompactTarget::new(0x7fffff, 0x20),
            genesis_timestamp: 1_767_225_600,
            genesis_address: None,
            retry: RetryPolicy {
                max_attempts: 5,
                base_backoff_ms: 0,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat == 0 {
            return Err(ConfigError::Invalid("heartbeat must be positive".into()));
        }
        if self.halving_number == 0 {
            return Err(ConfigError::Invalid("halving_number must be positive".into()));
        }
        if self.genesis_reward > self.total_supply {
            return Err(ConfigError::Invalid("genesis_reward exceeds total_supply".into()));
        }
        if self.genesis_target.coefficient == 0 {
            return Err(ConfigError::Invalid("genesis target is zero".into()));
        }
        Ok(())
    }

    /// Address credited by the genesis block
    pub fn genesis_address(&self) -> String {
        self.genesis_address
            .clone()
            .unwrap_or_else(|| address_from_pubkey(&PublicKey(GENERATOR_PUBKEY)))
    }
}
